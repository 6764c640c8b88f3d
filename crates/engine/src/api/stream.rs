//! SSE streaming of match events: replay from an offset, then live tail.
//!
//! The subscriber registers with the hub *before* replaying from the store,
//! so events appended during replay land in the live buffer and are deduped
//! by seq. The stream closes after a terminal event; a disconnected client
//! reconnects with `?after=lastSeenSeq` and misses nothing.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_channel::mpsc;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use worldbuild_domain::{MatchEvent, MatchId};

use crate::api::http::ApiError;
use crate::app::App;
use crate::infrastructure::hub::MatchHub;
use crate::infrastructure::ports::MatchStore;

/// Forwarder channel depth; hub-side buffering is what defines a slow
/// consumer, this only smooths the replay/live seam.
const FORWARD_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: i64,
}

pub async fn stream_events(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let match_id = MatchId::from_uuid(id);
    app.store
        .get_match(match_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let (subscriber_id, live_rx) = app.hub.subscribe(match_id).await;
    let (tx, rx) = mpsc::channel::<MatchEvent>(FORWARD_BUFFER);
    tokio::spawn(forward_events(
        app.store.clone(),
        app.hub.clone(),
        match_id,
        subscriber_id,
        query.after,
        live_rx,
        tx,
    ));

    let stream = rx.map(|event| Ok(sse_frame(&event)));
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

fn sse_frame(event: &MatchEvent) -> Event {
    Event::default()
        .id(event.seq.to_string())
        .data(serde_json::to_string(event).unwrap_or_default())
}

/// Replay persisted events after `after`, then forward live events in seq
/// order without duplicates until a terminal event or client disconnect.
pub(crate) async fn forward_events(
    store: Arc<dyn MatchStore>,
    hub: Arc<MatchHub>,
    match_id: MatchId,
    subscriber_id: Uuid,
    after: i64,
    mut live_rx: tokio::sync::mpsc::Receiver<MatchEvent>,
    mut tx: mpsc::Sender<MatchEvent>,
) {
    let mut last_seq = after;

    let forward = async {
        let replayed = match store.list_events(match_id, after).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(match_id = %match_id, error = %e, "Event replay failed");
                return;
            }
        };

        let mut terminal_seen = false;
        for event in replayed {
            last_seq = last_seq.max(event.seq);
            terminal_seen |= event.is_terminal();
            if tx.send(event).await.is_err() {
                return;
            }
        }
        if terminal_seen {
            return;
        }

        while let Some(event) = live_rx.recv().await {
            if event.seq <= last_seq {
                continue;
            }
            last_seq = event.seq;
            let terminal = event.is_terminal();
            if tx.send(event).await.is_err() {
                return;
            }
            if terminal {
                return;
            }
        }
    };
    forward.await;

    hub.unsubscribe(match_id, subscriber_id).await;
}
