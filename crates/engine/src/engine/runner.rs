//! Match orchestration.
//!
//! `MatchService` creates match records and runs one pipeline task per
//! match: challenge reveal, two concurrent team engines advancing phase by
//! phase behind a barrier, prompt packs, and completion. Any engine error
//! funnels into a single `match_failed` event.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use worldbuild_domain::{Challenge, EventPayload, MatchId, TeamId};

use crate::engine::challenge;
use crate::engine::deliberation::{EngineConfig, EngineError, TeamEngine};
use crate::engine::rules;
use crate::infrastructure::hub::MatchHub;
use crate::infrastructure::ports::{
    ClockPort, MatchRecord, MatchStatus, MatchStore, ProviderPort, StoreError,
};
use crate::infrastructure::recorder::MatchRecorder;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidTier(#[from] challenge::InvalidTier),
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct RunningMatch {
    handle: JoinHandle<()>,
    recorder: Arc<MatchRecorder>,
}

pub struct MatchService {
    store: Arc<dyn MatchStore>,
    hub: Arc<MatchHub>,
    provider: Arc<dyn ProviderPort>,
    clock: Arc<dyn ClockPort>,
    config: EngineConfig,
    running: RwLock<HashMap<MatchId, RunningMatch>>,
}

impl MatchService {
    pub fn new(
        store: Arc<dyn MatchStore>,
        hub: Arc<MatchHub>,
        provider: Arc<dyn ProviderPort>,
        clock: Arc<dyn ClockPort>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            hub,
            provider,
            clock,
            config,
            running: RwLock::new(HashMap::new()),
        }
    }

    /// Create a match record and start its pipeline. Returns synchronously;
    /// the pipeline runs concurrently.
    pub async fn create(self: &Arc<Self>, seed: Option<i64>, tier: u8) -> Result<MatchRecord, ServiceError> {
        let seed = seed.unwrap_or_else(|| rand::thread_rng().gen_range(0..i32::MAX as i64));
        // Fail fast on a bad tier before persisting anything.
        let challenge = challenge::generate(seed, tier)?;

        let match_id = MatchId::new();
        let record = MatchRecord {
            match_id,
            created_at: self.clock.now(),
            status: MatchStatus::Running,
            seed,
            tier,
            challenge: None,
            completed_at: None,
            canon_hash_a: None,
            canon_hash_b: None,
            error: None,
        };
        self.store.create_match(&record).await?;

        let recorder = Arc::new(MatchRecorder::new(
            match_id,
            self.store.clone(),
            self.hub.clone(),
            self.clock.clone(),
        ));

        let service = self.clone();
        let recorder_for_task = recorder.clone();
        let handle = tokio::spawn(async move {
            service.run_pipeline(recorder_for_task, seed, tier, challenge).await;
        });

        self.running
            .write()
            .await
            .insert(match_id, RunningMatch { handle, recorder });

        tracing::info!(match_id = %match_id, seed, tier, "Match created");
        Ok(record)
    }

    /// Cancel a running match: abort the pipeline and record the failure.
    /// Returns false if the match was not running.
    pub async fn cancel(&self, match_id: MatchId) -> Result<bool, StoreError> {
        let Some(running) = self.running.write().await.remove(&match_id) else {
            return Ok(false);
        };
        running.handle.abort();
        let _ = running.handle.await;

        if let Err(e) = running
            .recorder
            .append(
                None,
                EventPayload::MatchFailed {
                    error: "cancelled".to_string(),
                },
            )
            .await
        {
            tracing::warn!(match_id = %match_id, error = %e, "Failed to record cancellation event");
        }
        self.store
            .mark_failed(match_id, self.clock.now(), "cancelled")
            .await?;
        tracing::info!(match_id = %match_id, "Match cancelled");
        Ok(true)
    }

    /// Await a match's pipeline task. Used by tests and shutdown paths.
    pub async fn wait(&self, match_id: MatchId) {
        let running = self.running.write().await.remove(&match_id);
        if let Some(running) = running {
            let _ = running.handle.await;
        }
    }

    async fn run_pipeline(
        self: Arc<Self>,
        recorder: Arc<MatchRecorder>,
        seed: i64,
        tier: u8,
        challenge: Challenge,
    ) {
        let match_id = recorder.match_id();
        if let Err(e) = self.drive_match(&recorder, seed, tier, challenge).await {
            let error = e.to_string();
            tracing::error!(match_id = %match_id, error = %error, "Match failed");
            if let Err(append_err) = recorder
                .append(None, EventPayload::MatchFailed { error: error.clone() })
                .await
            {
                tracing::error!(
                    match_id = %match_id,
                    error = %append_err,
                    "Failed to record match failure"
                );
            }
            if let Err(mark_err) = self
                .store
                .mark_failed(match_id, self.clock.now(), &error)
                .await
            {
                tracing::error!(
                    match_id = %match_id,
                    error = %mark_err,
                    "Failed to mark match failed"
                );
            }
        }
        self.running.write().await.remove(&match_id);
    }

    async fn drive_match(
        &self,
        recorder: &Arc<MatchRecorder>,
        seed: i64,
        tier: u8,
        challenge: Challenge,
    ) -> Result<(), EngineError> {
        let match_id = recorder.match_id();

        recorder
            .append(None, EventPayload::MatchCreated { seed, tier })
            .await?;
        recorder
            .append(None, EventPayload::ChallengeRevealed(challenge.clone()))
            .await?;
        self.store.set_challenge(match_id, &challenge).await?;

        let mut team_a = TeamEngine::start(
            TeamId::A,
            seed,
            &challenge,
            self.provider.clone(),
            recorder.clone(),
            self.config.clone(),
        )
        .await?;
        let mut team_b = TeamEngine::start(
            TeamId::B,
            seed,
            &challenge,
            self.provider.clone(),
            recorder.clone(),
            self.config.clone(),
        )
        .await?;

        // Phase barrier: both teams must finish phase P before either
        // begins P+1. Within a phase the teams run concurrently.
        for phase in 1..=4u8 {
            recorder
                .append(
                    None,
                    EventPayload::PhaseStarted {
                        phase,
                        round_count: rules::rounds_for_phase(phase),
                    },
                )
                .await?;
            let (result_a, result_b) = tokio::join!(team_a.run_phase(phase), team_b.run_phase(phase));
            result_a?;
            result_b?;
        }

        recorder
            .append(
                None,
                EventPayload::PhaseStarted {
                    phase: 5,
                    round_count: 0,
                },
            )
            .await?;
        let (pack_a, pack_b) = tokio::join!(team_a.emit_prompt_pack(), team_b.emit_prompt_pack());
        pack_a?;
        pack_b?;

        let canon_hash_a = team_a.final_hash();
        let canon_hash_b = team_b.final_hash();
        recorder
            .append(
                None,
                EventPayload::MatchCompleted {
                    canon_hash_a: canon_hash_a.clone(),
                    canon_hash_b: canon_hash_b.clone(),
                },
            )
            .await?;
        self.store
            .mark_completed(match_id, self.clock.now(), &canon_hash_a, &canon_hash_b)
            .await?;

        tracing::info!(match_id = %match_id, "Match completed");
        Ok(())
    }
}
