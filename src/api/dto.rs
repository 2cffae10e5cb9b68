//! Request and response DTOs
//!
//! Every body on the wire is camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{
    CommentView, FeedItemView, Notification, NotificationView, PostView, ProfileView, User,
};
use crate::service::{BroadcastEvent, FeedDelivery, FollowToggle, LoginGrant, ToggleOutcome};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub content: String,
    pub spoiler_of: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// `GET /users` query
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(alias = "username")]
    pub search: Option<String>,
}

// =============================================================================
// Users
// =============================================================================

/// Author summary embedded in posts and comments
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A user's profile. `email` is only present when viewing yourself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub username: String,
    pub avatar_url: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
    pub me: bool,
    pub follower_of_mine: bool,
    pub following_of_mine: bool,
}

impl ProfileResponse {
    pub fn from_view(view: ProfileView, viewer_id: Option<&str>) -> Self {
        let me = viewer_id == Some(view.id.as_str());
        Self {
            email: me.then_some(view.email),
            username: view.username,
            avatar_url: view.avatar_url,
            followers_count: view.followers_count,
            following_count: view.following_count,
            created_at: view.created_at,
            me,
            follower_of_mine: view.follower_of_mine,
            following_of_mine: view.following_of_mine,
        }
    }
}

impl From<User> for ProfileResponse {
    /// The user looking at their own account
    fn from(user: User) -> Self {
        Self {
            email: Some(user.email),
            username: user.username,
            avatar_url: user.avatar_url,
            followers_count: user.followers_count,
            following_count: user.following_count,
            created_at: user.created_at,
            me: true,
            follower_of_mine: false,
            following_of_mine: false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: ProfileResponse,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<LoginGrant> for LoginResponse {
    fn from(grant: LoginGrant) -> Self {
        Self {
            user: grant.user.into(),
            token: grant.token,
            expires_at: grant.expires_at,
        }
    }
}

// =============================================================================
// Posts, comments, feed
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: String,
    pub content: String,
    pub spoiler_of: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub user: UserSummary,
    pub mine: bool,
    pub liked: bool,
    pub subscribed: bool,
}

impl From<PostView> for PostResponse {
    fn from(view: PostView) -> Self {
        Self {
            id: view.id,
            content: view.content,
            spoiler_of: view.spoiler_of,
            likes_count: view.likes_count,
            comments_count: view.comments_count,
            created_at: view.created_at,
            user: UserSummary {
                username: view.author_username,
                avatar_url: view.author_avatar_url,
            },
            mine: view.mine,
            liked: view.liked,
            subscribed: view.subscribed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub content: String,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub user: UserSummary,
    pub mine: bool,
    pub liked: bool,
}

impl From<CommentView> for CommentResponse {
    fn from(view: CommentView) -> Self {
        Self {
            id: view.id,
            content: view.content,
            likes_count: view.likes_count,
            created_at: view.created_at,
            user: UserSummary {
                username: view.author_username,
                avatar_url: view.author_avatar_url,
            },
            mine: view.mine,
            liked: view.liked,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntryResponse {
    pub id: i64,
    pub owner_user_id: String,
    pub post: PostResponse,
}

impl FeedEntryResponse {
    pub fn new(owner_user_id: &str, item: FeedItemView) -> Self {
        Self {
            id: item.id,
            owner_user_id: owner_user_id.to_owned(),
            post: item.post.into(),
        }
    }
}

// =============================================================================
// Toggles
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggleResponse {
    pub liked: bool,
    pub likes_count: i64,
}

impl From<ToggleOutcome> for LikeToggleResponse {
    fn from(outcome: ToggleOutcome) -> Self {
        Self {
            liked: outcome.active,
            likes_count: outcome.counter,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionToggleResponse {
    pub subscribed: bool,
    pub subscribers_count: i64,
}

impl From<ToggleOutcome> for SubscriptionToggleResponse {
    fn from(outcome: ToggleOutcome) -> Self {
        Self {
            subscribed: outcome.active,
            subscribers_count: outcome.counter,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowToggleResponse {
    pub following_of_mine: bool,
    pub followers_count: i64,
}

impl From<FollowToggle> for FollowToggleResponse {
    fn from(toggle: FollowToggle) -> Self {
        Self {
            following_of_mine: toggle.following_of_mine,
            followers_count: toggle.followers_count,
        }
    }
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: i64,
    pub recipient_user_id: String,
    pub actor_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_username: Option<String>,
    pub verb: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub read: bool,
}

impl From<NotificationView> for NotificationResponse {
    fn from(view: NotificationView) -> Self {
        Self {
            id: view.id,
            recipient_user_id: view.user_id,
            actor_user_id: view.actor_id,
            actor_username: Some(view.actor_username),
            verb: view.verb,
            object_id: view.object_id,
            target_id: view.target_id,
            issued_at: view.issued_at,
            read: view.read,
        }
    }
}

impl From<Notification> for NotificationResponse {
    fn from(row: Notification) -> Self {
        Self {
            id: row.id,
            recipient_user_id: row.user_id,
            actor_user_id: row.actor_id,
            actor_username: None,
            verb: row.verb,
            object_id: row.object_id,
            target_id: row.target_id,
            issued_at: row.issued_at,
            read: row.read,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub unread: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkedResponse {
    pub updated: u64,
}

// =============================================================================
// Stream events
// =============================================================================

/// Feed entry pushed over the event stream, with the post joined in
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntryEvent {
    pub id: i64,
    pub owner_user_id: String,
    pub post: PostResponse,
}

impl From<FeedDelivery> for FeedEntryEvent {
    fn from(delivery: FeedDelivery) -> Self {
        Self {
            id: delivery.entry.id,
            owner_user_id: delivery.entry.user_id,
            post: delivery.post.into(),
        }
    }
}

/// Serialize a broadcast event as the SSE `data` payload.
pub fn event_payload(event: BroadcastEvent) -> serde_json::Result<String> {
    match event {
        BroadcastEvent::FeedEntry(delivery) => {
            serde_json::to_string(&FeedEntryEvent::from(delivery))
        }
        BroadcastEvent::Notification(row) => {
            serde_json::to_string(&NotificationResponse::from(row))
        }
    }
}
