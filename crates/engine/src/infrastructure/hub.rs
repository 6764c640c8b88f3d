//! Live fan-out of match events to subscribers.
//!
//! Each subscriber gets a bounded channel. Publishing never blocks the
//! producer: a subscriber whose buffer is full is dropped with a
//! slow-consumer warning and its channel closes, which ends the client's
//! stream; the client reconnects with `after=lastDeliveredSeq`.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use worldbuild_domain::{MatchEvent, MatchId};

/// Buffered events per subscriber before it is considered slow.
pub const SUBSCRIBER_BUFFER: usize = 256;

struct Subscriber {
    id: Uuid,
    sender: mpsc::Sender<MatchEvent>,
}

/// Per-match subscriber registry.
pub struct MatchHub {
    subscribers: RwLock<HashMap<MatchId, Vec<Subscriber>>>,
}

impl MatchHub {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber for a match's live events.
    pub async fn subscribe(&self, match_id: MatchId) -> (Uuid, mpsc::Receiver<MatchEvent>) {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(match_id)
            .or_default()
            .push(Subscriber { id, sender });
        tracing::debug!(match_id = %match_id, subscriber_id = %id, "Subscriber registered");
        (id, receiver)
    }

    pub async fn unsubscribe(&self, match_id: MatchId, subscriber_id: Uuid) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(list) = subscribers.get_mut(&match_id) {
            list.retain(|s| s.id != subscriber_id);
            if list.is_empty() {
                subscribers.remove(&match_id);
            }
        }
    }

    /// Deliver an event to every live subscriber of its match.
    ///
    /// Never blocks: slow consumers are evicted instead.
    pub async fn publish(&self, event: &MatchEvent) {
        let mut slow: Vec<Uuid> = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            let Some(list) = subscribers.get(&event.match_id) else {
                return;
            };
            for subscriber in list {
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            match_id = %event.match_id,
                            subscriber_id = %subscriber.id,
                            "Dropping slow consumer"
                        );
                        slow.push(subscriber.id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        slow.push(subscriber.id);
                    }
                }
            }
        }

        if !slow.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            if let Some(list) = subscribers.get_mut(&event.match_id) {
                list.retain(|s| !slow.contains(&s.id));
                if list.is_empty() {
                    subscribers.remove(&event.match_id);
                }
            }
        }
    }

    pub async fn subscriber_count(&self, match_id: MatchId) -> usize {
        self.subscribers
            .read()
            .await
            .get(&match_id)
            .map(|list| list.len())
            .unwrap_or(0)
    }
}

impl Default for MatchHub {
    fn default() -> Self {
        Self::new()
    }
}
