//! Event stream
//!
//! Pushes the principal's new feed entries and notifications via
//! Server-Sent Events as fan-out workers create them.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use super::dto::event_payload;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::service::BroadcastEvent;

fn to_sse(user_id: &str, received: Result<BroadcastEvent, BroadcastStreamRecvError>) -> Option<Event> {
    let event = match received {
        Ok(event) => event,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(user_id, skipped, "Stream subscriber lagged, events skipped");
            return None;
        }
    };
    if event.recipient_id() != user_id {
        return None;
    }

    let kind = event.kind();
    match event_payload(event) {
        Ok(data) => Some(Event::default().event(kind).data(data)),
        Err(error) => {
            tracing::error!(user_id, kind, %error, "Failed to encode stream event");
            None
        }
    }
}

/// GET /api/stream
pub async fn stream(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = principal.user_id;
    tracing::debug!(%user_id, "Stream opened");

    let events = BroadcastStream::new(state.broadcast.subscribe())
        .filter_map(move |received| to_sse(&user_id, received))
        .map(Ok);

    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::feed_event;

    fn entry(owner: &str) -> BroadcastEvent {
        feed_event(owner, "p1", "hello")
    }

    #[test]
    fn only_the_recipient_sees_an_event() {
        assert!(to_sse("alice", Ok(entry("alice"))).is_some());
        assert!(to_sse("bob", Ok(entry("alice"))).is_none());
    }

    #[test]
    fn lagged_receivers_skip_instead_of_closing() {
        assert!(to_sse("alice", Err(BroadcastStreamRecvError::Lagged(3))).is_none());
    }
}
