//! API layer
//!
//! HTTP handlers for:
//! - Users, posts and comments, including the toggle endpoints
//! - Feed and notifications
//! - Session login/logout and the event stream
//! - Metrics (Prometheus)

mod comments;
mod dto;
mod feed;
pub mod metrics;
mod posts;
mod session;
mod streaming;
mod users;

pub use dto::*;
pub use metrics::metrics_router;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

/// Routes mounted under `/api`
///
/// Handlers taking `CurrentUser` answer 401 without a valid session;
/// those taking `MaybeUser` also serve anonymous viewers.
pub fn api_router() -> Router<AppState> {
    Router::new()
        // Session
        .route("/login", post(session::login))
        .route("/logout", post(session::logout))
        .route("/me", get(session::me))
        // Users
        .route("/users", post(users::create_user).get(users::search_users))
        .route("/users/:username", get(users::get_user))
        .route("/users/:username/toggle_follow", post(users::toggle_follow))
        .route("/users/:username/posts", get(users::user_posts))
        // Posts
        .route("/posts", post(posts::create_post))
        .route("/posts/:post_id", get(posts::get_post))
        .route("/posts/:post_id/toggle_like", post(posts::toggle_like))
        .route(
            "/posts/:post_id/toggle_subscription",
            post(posts::toggle_subscription),
        )
        // Comments
        .route(
            "/posts/:post_id/comments",
            post(comments::create_comment).get(comments::list_comments),
        )
        .route(
            "/comments/:comment_id/toggle_like",
            post(comments::toggle_like),
        )
        // Feed and notifications
        .route("/feed", get(feed::get_feed))
        .route("/notifications", get(feed::get_notifications))
        .route(
            "/notifications/:id/mark_as_read",
            post(feed::mark_as_read),
        )
        .route("/mark_notifications_as_read", post(feed::mark_all_as_read))
        .route("/check_unread_notifications", get(feed::check_unread))
        // Real-time
        .route("/stream", get(streaming::stream))
        .layer(axum::middleware::from_fn(metrics::track_requests))
}
