//! Event Stream API Handler
//!
//! Server-sent events: every subscriber first receives a `project/list`
//! snapshot, then the live feed in publish order.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::service::events::EventBus;
use crate::service::projects_service;
use crate::state::SharedState;

/// Unregisters the subscriber when the client goes away and the stream is
/// dropped.
struct SubscriberGuard {
    id: u64,
    bus: EventBus,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// GET /project/events
pub async fn stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, events) = state.bus.subscribe().await;
    let guard = SubscriberGuard {
        id,
        bus: state.bus.clone(),
    };
    tracing::debug!("Event stream {} opened", id);

    let snapshot = json!({
        "event": "project/list",
        "projects": projects_service::project_list(&state),
    })
    .to_string();

    let stream = tokio_stream::once(snapshot)
        .chain(ReceiverStream::new(events))
        .map(move |data| {
            let _live = &guard;
            Ok::<_, Infallible>(Event::default().data(data))
        });

    Sse::new(stream)
}
