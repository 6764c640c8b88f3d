//! Single-writer event recorder for one match.
//!
//! Assigns gap-free, strictly increasing `seq` values at append time,
//! persists the event, then publishes it to live subscribers. The seq
//! counter lock is held across the store append so concurrent team engines
//! serialize into one total order per match.

use std::sync::Arc;

use tokio::sync::Mutex;

use worldbuild_domain::{EventPayload, MatchEvent, MatchId, TeamId};

use crate::infrastructure::hub::MatchHub;
use crate::infrastructure::ports::{ClockPort, MatchStore, StoreError};

pub struct MatchRecorder {
    match_id: MatchId,
    store: Arc<dyn MatchStore>,
    hub: Arc<MatchHub>,
    clock: Arc<dyn ClockPort>,
    seq: Mutex<i64>,
}

impl MatchRecorder {
    pub fn new(
        match_id: MatchId,
        store: Arc<dyn MatchStore>,
        hub: Arc<MatchHub>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            match_id,
            store,
            hub,
            clock,
            seq: Mutex::new(0),
        }
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Append one event: assign seq and ts, persist, then fan out.
    pub async fn append(
        &self,
        team_id: Option<TeamId>,
        payload: EventPayload,
    ) -> Result<MatchEvent, StoreError> {
        let mut seq = self.seq.lock().await;
        // Advance the counter only once the event is durable, so a failed
        // or cancelled append cannot leave a permanent gap.
        let next = *seq + 1;
        let event = MatchEvent {
            id: format!("{}:{}", self.match_id, next),
            seq: next,
            ts: self.clock.now(),
            match_id: self.match_id,
            team_id,
            payload,
        };
        self.store.append_event(&event).await?;
        *seq = next;

        tracing::debug!(
            match_id = %self.match_id,
            seq = event.seq,
            event_type = event.payload.kind(),
            "Event appended"
        );
        // Publish before releasing the seq lock so subscribers observe
        // events in seq order; publishing never blocks (try_send).
        self.hub.publish(&event).await;
        drop(seq);
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::SystemClock;
    use crate::infrastructure::persistence::SqliteStore;
    use crate::infrastructure::ports::{MatchRecord, MatchStatus};
    use chrono::Utc;

    async fn recorder_with_store() -> (tempfile::TempDir, Arc<SqliteStore>, MatchRecorder) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteStore::new(&dir.path().join("arena.db").to_string_lossy())
                .await
                .unwrap(),
        );
        let match_id = MatchId::new();
        store
            .create_match(&MatchRecord {
                match_id,
                created_at: Utc::now(),
                status: MatchStatus::Running,
                seed: 1,
                tier: 1,
                challenge: None,
                completed_at: None,
                canon_hash_a: None,
                canon_hash_b: None,
                error: None,
            })
            .await
            .unwrap();
        let recorder = MatchRecorder::new(
            match_id,
            store.clone(),
            Arc::new(MatchHub::new()),
            Arc::new(SystemClock),
        );
        (dir, store, recorder)
    }

    #[tokio::test]
    async fn concurrent_appends_stay_gap_free() {
        let (_dir, store, recorder) = recorder_with_store().await;
        let recorder = Arc::new(recorder);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let recorder = recorder.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    recorder
                        .append(None, EventPayload::PhaseStarted { phase: 1, round_count: 3 })
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let events = store.list_events(recorder.match_id(), 0).await.unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, (1..=40).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn event_id_embeds_match_and_seq() {
        let (_dir, _store, recorder) = recorder_with_store().await;
        let event = recorder
            .append(None, EventPayload::MatchCreated { seed: 1, tier: 1 })
            .await
            .unwrap();
        assert_eq!(event.id, format!("{}:1", recorder.match_id()));
    }
}
