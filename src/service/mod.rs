//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services run their writes through the transaction boundary and hand
//! follow-up fan-out work to the dispatcher.

pub mod broadcast;
mod comment;
pub mod dispatch;
mod feed;
pub mod mention;
mod notification;
mod post;
pub mod toggle;
mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use broadcast::{BroadcastEvent, BroadcastSink, ChannelSink, FeedDelivery, NoopSink};
pub use comment::CommentService;
pub use dispatch::{FanoutDispatcher, FanoutHandlers, FanoutJob};
pub use feed::FeedService;
pub use notification::NotificationService;
pub use post::PostService;
pub use toggle::{ToggleEngine, ToggleOutcome};
pub use user::{FollowToggle, LoginGrant, UserService};
