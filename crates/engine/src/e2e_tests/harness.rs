use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use worldbuild_domain::{Challenge, MatchEvent, MatchId, PromptPack, TeamId};

use crate::engine::deliberation::EngineConfig;
use crate::engine::runner::MatchService;
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::hub::MatchHub;
use crate::infrastructure::persistence::SqliteStore;
use crate::infrastructure::ports::{
    ConversationHandle, MatchStore, ProviderError, ProviderPort, TurnGeneration, TurnSpec,
};
use crate::infrastructure::providers::mock::MockProvider;
use crate::infrastructure::resilient::{ResilientProvider, RetryConfig};

pub struct Harness {
    _dir: tempfile::TempDir,
    pub store: Arc<SqliteStore>,
    pub hub: Arc<MatchHub>,
    pub mock: Arc<MockProvider>,
    pub service: Arc<MatchService>,
}

impl Harness {
    pub async fn new(mock: MockProvider) -> Self {
        Self::build(mock, false).await
    }

    /// Harness whose provider sleeps on every call, for cancellation tests.
    pub async fn new_slow(mock: MockProvider) -> Self {
        Self::build(mock, true).await
    }

    async fn build(mock: MockProvider, slow: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(
            SqliteStore::new(&dir.path().join("arena.db").to_string_lossy())
                .await
                .expect("create store"),
        );
        let hub = Arc::new(MatchHub::new());
        let mock = Arc::new(mock);

        let inner: Arc<dyn ProviderPort> = if slow {
            Arc::new(SlowProvider(mock.clone()))
        } else {
            mock.clone()
        };
        let provider = Arc::new(ResilientProvider::new(
            inner,
            RetryConfig {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 5,
                jitter_factor: 0.0,
                call_timeout: Duration::from_secs(5),
            },
        ));

        let service = Arc::new(MatchService::new(
            store.clone(),
            hub.clone(),
            provider,
            Arc::new(SystemClock),
            EngineConfig::default(),
        ));

        Self {
            _dir: dir,
            store,
            hub,
            mock,
            service,
        }
    }

    /// Create a match, run it to termination, return its id and full log.
    pub async fn run_match(&self, seed: i64, tier: u8) -> (MatchId, Vec<MatchEvent>) {
        let record = self
            .service
            .create(Some(seed), tier)
            .await
            .expect("create match");
        self.service.wait(record.match_id).await;
        let events = self
            .store
            .list_events(record.match_id, 0)
            .await
            .expect("list events");
        (record.match_id, events)
    }
}

/// Delays every provider call so tests can observe a match in flight.
struct SlowProvider(Arc<MockProvider>);

#[async_trait]
impl ProviderPort for SlowProvider {
    async fn start_conversation(
        &self,
        team_id: TeamId,
        match_seed: i64,
        challenge: &Challenge,
        initial_canon: &Value,
    ) -> Result<ConversationHandle, ProviderError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.0
            .start_conversation(team_id, match_seed, challenge, initial_canon)
            .await
    }

    async fn generate_turn(
        &self,
        handle: &ConversationHandle,
        spec: &TurnSpec,
    ) -> Result<TurnGeneration, ProviderError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.0.generate_turn(handle, spec).await
    }

    async fn generate_prompt_pack(
        &self,
        match_seed: i64,
        team_id: TeamId,
        canon: &Value,
    ) -> Result<PromptPack, ProviderError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.0.generate_prompt_pack(match_seed, team_id, canon).await
    }
}
