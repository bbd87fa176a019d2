//! Server-Sent Events (SSE) for reconciliation progress streaming

use crate::AppState;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct EventStreamQuery {
    /// Only forward events of this run
    pub run_id: Option<Uuid>,
    /// Include per-record events (resolved/skipped/failed)
    #[serde(default)]
    pub records: bool,
}

/// GET /reconcile/events - SSE event stream for reconciliation runs
///
/// Streams run lifecycle, progress, checkpoint and quota events. Per-record
/// events are opt-in with `?records=true`.
pub async fn reconcile_event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventStreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(run_id = ?query.run_id, "New SSE client connected to reconcile events");

    let mut rx = state.event_bus.subscribe();
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        loop {
            let received = tokio::select! {
                received = rx.recv() => received,
                _ = shutdown.cancelled() => break,
            };

            let event = match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE: client lagging, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if query.run_id.is_some_and(|id| id != event.run_id()) {
                continue;
            }

            let per_record = matches!(
                event.event_type(),
                "RecordResolved" | "RecordSkipped" | "RecordFailed"
            );
            if per_record && !query.records {
                continue;
            }

            let event_type = event.event_type();
            match serde_json::to_string(&event) {
                Ok(event_json) => {
                    debug!("SSE: Broadcasting event: {}", event_type);
                    yield Ok(Event::default().event(event_type).data(event_json));
                }
                Err(e) => {
                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
