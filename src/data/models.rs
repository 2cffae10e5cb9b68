//! Data models
//!
//! Rust structs representing database rows and the joined views
//! read back for API responses.
//! Entities created by the application use ULID IDs; fan-out rows
//! (feed entries, notifications) get their integer IDs from the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Users
// =============================================================================

/// A registered user
///
/// `followers_count` and `following_count` are cached aggregates of the
/// `follows` table and only change together with a follow edge.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
    /// Watermark below which notifications count as seen
    pub notifications_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A user as seen by a (possibly anonymous) viewer
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileView {
    pub id: String,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
    /// The viewed user follows the viewer
    pub follower_of_mine: bool,
    /// The viewer follows the viewed user
    pub following_of_mine: bool,
}

// =============================================================================
// Posts and comments
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub spoiler_of: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub subscribers_count: i64,
    pub created_at: DateTime<Utc>,
}

/// A post joined with its author and the viewer's relation to it
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostView {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub spoiler_of: Option<String>,
    pub likes_count: i64,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    pub mine: bool,
    pub liked: bool,
    pub subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub post_id: String,
    pub content: String,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentView {
    pub id: String,
    pub content: String,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
    pub author_username: String,
    pub author_avatar_url: Option<String>,
    pub mine: bool,
    pub liked: bool,
}

// =============================================================================
// Feed
// =============================================================================

/// One materialized copy of a post in an owner's feed
///
/// Append-only; never updated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FeedEntry {
    pub id: i64,
    /// Feed owner
    pub user_id: String,
    pub post_id: String,
}

/// A feed entry joined with the post it references
#[derive(Debug, Clone)]
pub struct FeedItemView {
    pub id: i64,
    pub post: PostView,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for FeedItemView {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("feed_id")?,
            post: PostView::from_row(row)?,
        })
    }
}

// =============================================================================
// Notifications
// =============================================================================

/// Notification row
///
/// Append-only except for `read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    /// Recipient
    pub user_id: String,
    pub actor_id: String,
    /// One of `NotificationVerb::as_str`
    pub verb: String,
    pub object_id: Option<String>,
    pub target_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub read: bool,
}

/// Notification joined with the actor's username
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationView {
    pub id: i64,
    pub user_id: String,
    pub actor_id: String,
    pub actor_username: String,
    pub verb: String,
    pub object_id: Option<String>,
    pub target_id: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub read: bool,
}

/// Notification verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationVerb {
    Follow,
    Comment,
    PostMention,
    CommentMention,
}

impl NotificationVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Comment => "comment",
            Self::PostMention => "post_mention",
            Self::CommentMention => "comment_mention",
        }
    }
}
