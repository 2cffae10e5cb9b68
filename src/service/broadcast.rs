//! Broadcast sink
//!
//! Fan-out workers hand every row they create to a [`BroadcastSink`]. The
//! sink is only a delivery hook: losing an event never affects stored state.

use tokio::sync::broadcast;

use crate::data::{FeedEntry, Notification, PostView};
use crate::error::AppError;

/// A new feed entry together with the post it points at
///
/// The post is loaded without a viewer, so `mine`, `liked` and `subscribed`
/// are all false.
#[derive(Debug, Clone)]
pub struct FeedDelivery {
    pub entry: FeedEntry,
    pub post: PostView,
}

/// A row created by a fan-out job
#[derive(Debug, Clone)]
pub enum BroadcastEvent {
    FeedEntry(FeedDelivery),
    Notification(Notification),
}

impl BroadcastEvent {
    /// User the event is addressed to
    pub fn recipient_id(&self) -> &str {
        match self {
            Self::FeedEntry(delivery) => &delivery.entry.user_id,
            Self::Notification(notification) => &notification.user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::FeedEntry(_) => "feed_entry",
            Self::Notification(_) => "notification",
        }
    }
}

/// Real-time delivery hook for created rows
#[cfg_attr(test, mockall::automock)]
pub trait BroadcastSink: Send + Sync {
    fn publish(&self, event: &BroadcastEvent) -> Result<(), AppError>;
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl BroadcastSink for NoopSink {
    fn publish(&self, _event: &BroadcastEvent) -> Result<(), AppError> {
        Ok(())
    }
}

/// In-process sink backed by a tokio broadcast channel
///
/// Subscribers that fall behind lose the oldest events.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }
}

impl BroadcastSink for ChannelSink {
    fn publish(&self, event: &BroadcastEvent) -> Result<(), AppError> {
        // No listeners is not a failure.
        let _ = self.sender.send(event.clone());
        Ok(())
    }
}

/// Publish every event, logging and counting the ones the sink refuses.
pub fn publish_all(sink: &dyn BroadcastSink, events: impl IntoIterator<Item = BroadcastEvent>) {
    for event in events {
        if let Err(error) = sink.publish(&event) {
            crate::metrics::BROADCAST_FAILURES_TOTAL
                .with_label_values(&[event.kind()])
                .inc();
            tracing::warn!(
                kind = event.kind(),
                recipient = event.recipient_id(),
                %error,
                "Broadcast sink rejected event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::feed_event;

    #[tokio::test]
    async fn channel_sink_delivers_to_subscribers() {
        let sink = ChannelSink::new(8);
        let mut receiver = sink.subscribe();

        sink.publish(&feed_event("alice", "post", "hi")).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.recipient_id(), "alice");
    }

    #[test]
    fn channel_sink_without_subscribers_succeeds() {
        let sink = ChannelSink::new(8);
        assert!(sink.publish(&feed_event("alice", "post", "hi")).is_ok());
    }

    #[test]
    fn publish_all_continues_after_failure() {
        let mut sink = MockBroadcastSink::new();
        sink.expect_publish()
            .times(3)
            .returning(|event| match event.recipient_id() {
                "bob" => Err(AppError::Internal(anyhow::anyhow!("closed"))),
                _ => Ok(()),
            });

        publish_all(
            &sink,
            vec![feed_event("alice", "post", "hi"), feed_event("bob", "post", "hi"), feed_event("carol", "post", "hi")],
        );
    }
}
