use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axis_events::{Envelope, EventKind};
use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures_util::{future, stream, Stream, StreamExt as _};
use tracing::{debug, warn};

use crate::snapshot_cache::SnapshotCache;
use crate::AppState;

pub(crate) const KEEP_ALIVE: Duration = Duration::from_secs(15);

/// The one place an envelope becomes a push frame.
pub(crate) fn sse_event(env: &Envelope) -> SseEvent {
    // Field order follows call order: `event:` must precede `data:`.
    let ev = match env.kind.sse_name() {
        Some(name) => SseEvent::default().event(name),
        None => SseEvent::default(),
    };
    ev.data(env.data.as_ref())
}

async fn initial_snapshot(cache: Arc<SnapshotCache>) -> Option<Envelope> {
    let items = cache.current().await;
    if items.is_empty() {
        return None;
    }
    match serde_json::to_string(&items) {
        Ok(data) => Some(Envelope {
            kind: EventKind::Snapshot,
            data: data.into(),
        }),
        Err(err) => {
            warn!(target: "axis::events", %err, "initial snapshot not serializable");
            None
        }
    }
}

/// Push channel. The subscription is registered before the response is
/// returned so no broadcast is missed; the initial snapshot is computed once
/// the stream is polled, and dropping the stream deregisters it.
pub async fn events_sse(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.hub().subscribe();
    debug!(target: "axis::events", subscriber = subscription.id(), "sse client connected");

    let initial = stream::once(initial_snapshot(state.cache().clone())).filter_map(future::ready);
    let stream = initial
        .chain(subscription)
        .map(|env| Ok(sse_event(&env)));
    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE))
}
