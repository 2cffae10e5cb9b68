//! Statements executed inside a write transaction
//!
//! Everything here takes the transaction's connection rather than the pool.
//! Fan-out inserts are set-based: one statement per trigger, however many
//! rows it produces.

use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::edges::{self, EdgeKind};
use super::models::*;
use crate::error::AppError;

/// Insert a post with zeroed counters.
pub async fn insert_post(
    conn: &mut SqliteConnection,
    author_id: &str,
    content: &str,
    spoiler_of: Option<&str>,
) -> Result<Post, AppError> {
    let post = sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO posts (id, user_id, content, spoiler_of)
        VALUES (?, ?, ?, ?)
        RETURNING id, user_id, content, spoiler_of, likes_count, comments_count,
                  subscribers_count, created_at
        "#,
    )
    .bind(EntityId::new().0)
    .bind(author_id)
    .bind(content)
    .bind(spoiler_of)
    .fetch_one(&mut *conn)
    .await?;

    Ok(post)
}

/// Subscribe the author to their own post and keep `subscribers_count` in step.
pub async fn subscribe_author(conn: &mut SqliteConnection, post: &mut Post) -> Result<(), AppError> {
    edges::insert(&mut *conn, EdgeKind::Subscription, &post.user_id, &post.id).await?;
    post.subscribers_count =
        edges::adjust_counter(&mut *conn, EdgeKind::Subscription.object_counter(), &post.id, 1)
            .await?;
    Ok(())
}

/// Insert a comment and bump the post's `comments_count`.
///
/// A missing post fails with `NotFound`.
pub async fn insert_comment(
    conn: &mut SqliteConnection,
    author_id: &str,
    post_id: &str,
    content: &str,
) -> Result<Comment, AppError> {
    let post_exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts WHERE id = ?)")
        .bind(post_id)
        .fetch_one(&mut *conn)
        .await?;
    if !post_exists {
        return Err(AppError::NotFound);
    }

    let comment = sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (id, user_id, post_id, content)
        VALUES (?, ?, ?, ?)
        RETURNING id, user_id, post_id, content, likes_count, created_at
        "#,
    )
    .bind(EntityId::new().0)
    .bind(author_id)
    .bind(post_id)
    .bind(content)
    .fetch_one(&mut *conn)
    .await?;

    edges::adjust_counter(&mut *conn, edges::POST_COMMENTS, post_id, 1).await?;

    Ok(comment)
}

// =============================================================================
// Feed
// =============================================================================

/// Put a post into one owner's feed. `None` when it is already there.
pub async fn insert_feed_entry(
    conn: &mut SqliteConnection,
    owner_id: &str,
    post_id: &str,
) -> Result<Option<FeedEntry>, AppError> {
    let entry = sqlx::query_as::<_, FeedEntry>(
        "INSERT OR IGNORE INTO feed (user_id, post_id) VALUES (?, ?) RETURNING id, user_id, post_id",
    )
    .bind(owner_id)
    .bind(post_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(entry)
}

/// Copy a post into the feed of every follower of its author.
///
/// Followers who already have the post are skipped, so running this twice
/// for the same post inserts nothing the second time.
pub async fn insert_follower_feed_entries(
    conn: &mut SqliteConnection,
    author_id: &str,
    post_id: &str,
) -> Result<Vec<FeedEntry>, AppError> {
    let entries = sqlx::query_as::<_, FeedEntry>(
        r#"
        INSERT OR IGNORE INTO feed (user_id, post_id)
        SELECT follower_id, ? FROM follows WHERE following_id = ?
        RETURNING id, user_id, post_id
        "#,
    )
    .bind(post_id)
    .bind(author_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(entries)
}

// =============================================================================
// Notifications
// =============================================================================

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, actor_id, verb, object_id, target_id, issued_at, read";

/// Insert the follow notification for `actor -> recipient` unless one was ever issued.
pub async fn insert_follow_notification_once(
    conn: &mut SqliteConnection,
    recipient_id: &str,
    actor_id: &str,
) -> Result<Option<Notification>, AppError> {
    let already_notified: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM notifications WHERE user_id = ? AND actor_id = ? AND verb = ?)",
    )
    .bind(recipient_id)
    .bind(actor_id)
    .bind(NotificationVerb::Follow.as_str())
    .fetch_one(&mut *conn)
    .await?;
    if already_notified {
        return Ok(None);
    }

    let sql = format!(
        "INSERT INTO notifications (user_id, actor_id, verb) VALUES (?, ?, ?) \
         RETURNING {NOTIFICATION_COLUMNS}"
    );
    let notification = sqlx::query_as::<_, Notification>(&sql)
        .bind(recipient_id)
        .bind(actor_id)
        .bind(NotificationVerb::Follow.as_str())
        .fetch_one(&mut *conn)
        .await?;

    Ok(Some(notification))
}

/// Notify every subscriber of the comment's post except its author.
pub async fn insert_comment_notifications(
    conn: &mut SqliteConnection,
    comment: &Comment,
) -> Result<Vec<Notification>, AppError> {
    let sql = format!(
        "INSERT INTO notifications (user_id, actor_id, verb, object_id, target_id) \
         SELECT user_id, ?, ?, ?, ? FROM subscriptions WHERE post_id = ? AND user_id != ? \
         RETURNING {NOTIFICATION_COLUMNS}"
    );

    let notifications = sqlx::query_as::<_, Notification>(&sql)
        .bind(&comment.user_id)
        .bind(NotificationVerb::Comment.as_str())
        .bind(&comment.id)
        .bind(&comment.post_id)
        .bind(&comment.post_id)
        .bind(&comment.user_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(notifications)
}

/// Notify the users named in `usernames`, skipping the actor and unknown names.
pub async fn insert_mention_notifications(
    conn: &mut SqliteConnection,
    actor_id: &str,
    verb: NotificationVerb,
    object_id: &str,
    target_id: Option<&str>,
    usernames: &[String],
) -> Result<Vec<Notification>, AppError> {
    if usernames.is_empty() {
        return Ok(Vec::new());
    }

    let mut query_builder = QueryBuilder::<Sqlite>::new(
        "INSERT INTO notifications (user_id, actor_id, verb, object_id, target_id) SELECT id, ",
    );
    query_builder.push_bind(actor_id);
    query_builder.push(", ");
    query_builder.push_bind(verb.as_str());
    query_builder.push(", ");
    query_builder.push_bind(object_id);
    query_builder.push(", ");
    query_builder.push_bind(target_id);
    query_builder.push(" FROM users WHERE username IN (");
    {
        let mut separated = query_builder.separated(", ");
        for username in usernames {
            separated.push_bind(username);
        }
    }
    query_builder.push(") AND id != ");
    query_builder.push_bind(actor_id);
    query_builder.push(" RETURNING ");
    query_builder.push(NOTIFICATION_COLUMNS);

    let notifications = query_builder
        .build_query_as::<Notification>()
        .fetch_all(&mut *conn)
        .await?;

    Ok(notifications)
}
