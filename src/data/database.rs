//! SQLite database operations
//!
//! All database access goes through this module. Single-statement reads and
//! writes are methods on [`Database`]; multi-statement writes go through
//! [`Database::run_transaction`] with the helpers in `edges` and `writes`.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, SqliteConnection, SqlitePool};
use std::path::Path;
use std::time::Duration;

use super::edges::{self, EdgeKind};
use super::models::*;
use super::transaction::{self, RetryPolicy, TxFuture};
use crate::config::DatabaseConfig;
use crate::error::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// Columns of a [`PostView`]; binds the viewer three times.
const POST_VIEW_COLUMNS: &str = r#"
    p.id, p.user_id, p.content, p.spoiler_of, p.likes_count, p.comments_count, p.created_at,
    u.username AS author_username, u.avatar_url AS author_avatar_url,
    (p.user_id IS ?) AS mine,
    EXISTS (SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id IS ?) AS liked,
    EXISTS (SELECT 1 FROM subscriptions s WHERE s.post_id = p.id AND s.user_id IS ?) AS subscribed
"#;

/// Columns of a [`ProfileView`]; binds the viewer twice.
const PROFILE_VIEW_COLUMNS: &str = r#"
    u.id, u.email, u.username, u.avatar_url, u.followers_count, u.following_count, u.created_at,
    EXISTS (SELECT 1 FROM follows f WHERE f.follower_id = u.id AND f.following_id IS ?) AS follower_of_mine,
    EXISTS (SELECT 1 FROM follows f WHERE f.follower_id IS ? AND f.following_id = u.id) AS following_of_mine
"#;

const USER_COLUMNS: &str = "id, email, username, avatar_url, followers_count, following_count, \
                            notifications_seen_at, created_at";

const SEARCH_LIMIT: i64 = 20;

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
    retry: RetryPolicy,
}

impl Database {
    /// Connect to SQLite database with default pool settings
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        Self::connect_with(
            path,
            DEFAULT_MAX_CONNECTIONS,
            DEFAULT_BUSY_TIMEOUT,
            RetryPolicy::default(),
        )
        .await
    }

    /// Connect using the `[database]` config section and a retry policy.
    pub async fn open(config: &DatabaseConfig, retry: RetryPolicy) -> Result<Self, AppError> {
        Self::connect_with(
            &config.path,
            config.max_connections,
            config.busy_timeout(),
            retry,
        )
        .await
    }

    /// Connect with explicit pool settings.
    ///
    /// A zero `busy_timeout` reports every lock conflict straight to the
    /// transaction retry loop instead of waiting inside SQLite.
    pub async fn connect_with(
        path: &Path,
        max_connections: u32,
        busy_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(
            path = %path.display(),
            max_connections,
            busy_timeout_ms = busy_timeout.as_millis() as u64,
            "Database connected and migrated successfully"
        );

        Ok(Self { pool, retry })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `body` as one serializable transaction.
    ///
    /// The body may run several times when it conflicts with a concurrent
    /// writer, so it must only touch the store.
    pub async fn run_transaction<T, F>(&self, label: &'static str, body: F) -> Result<T, AppError>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
    {
        transaction::run(&self.pool, &self.retry, label, body).await
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Create a user.
    ///
    /// # Errors
    /// `FieldTaken("email")` or `FieldTaken("username")` when either is in use
    pub async fn insert_user(&self, email: &str, username: &str) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (id, email, username) VALUES (?, ?, ?) RETURNING {USER_COLUMNS}"
        );

        let result = sqlx::query_as::<_, User>(&sql)
            .bind(EntityId::new().0)
            .bind(email)
            .bind(username)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db_error)) if db_error.is_unique_violation() => {
                let field = if db_error.message().contains("users.email") {
                    "email"
                } else {
                    "username"
                };
                Err(AppError::FieldTaken(field))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Profile of `username` as seen by `viewer_id`
    pub async fn get_profile(
        &self,
        viewer_id: Option<&str>,
        username: &str,
    ) -> Result<Option<ProfileView>, AppError> {
        let sql = format!("SELECT {PROFILE_VIEW_COLUMNS} FROM users u WHERE u.username = ?");
        let profile = sqlx::query_as::<_, ProfileView>(&sql)
            .bind(viewer_id)
            .bind(viewer_id)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    /// Case-insensitive username substring search, excluding the viewer.
    pub async fn search_profiles(
        &self,
        viewer_id: Option<&str>,
        query: &str,
    ) -> Result<Vec<ProfileView>, AppError> {
        let sql = format!(
            "SELECT {PROFILE_VIEW_COLUMNS} FROM users u \
             WHERE u.username LIKE '%' || ? || '%' ESCAPE '\\' AND u.id IS NOT ? \
             ORDER BY u.username LIMIT ?"
        );
        let profiles = sqlx::query_as::<_, ProfileView>(&sql)
            .bind(viewer_id)
            .bind(viewer_id)
            .bind(escape_like(query))
            .bind(viewer_id)
            .bind(SEARCH_LIMIT)
            .fetch_all(&self.pool)
            .await?;

        Ok(profiles)
    }

    // =========================================================================
    // Posts
    // =========================================================================

    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, AppError> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT id, user_id, content, spoiler_of, likes_count, comments_count, \
             subscribers_count, created_at FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    pub async fn get_post_view(
        &self,
        viewer_id: Option<&str>,
        post_id: &str,
    ) -> Result<Option<PostView>, AppError> {
        let sql = format!(
            "SELECT {POST_VIEW_COLUMNS} FROM posts p JOIN users u ON u.id = p.user_id WHERE p.id = ?"
        );
        let post = sqlx::query_as::<_, PostView>(&sql)
            .bind(viewer_id)
            .bind(viewer_id)
            .bind(viewer_id)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(post)
    }

    /// Posts written by `author_id`, newest first
    pub async fn get_post_views_by_author(
        &self,
        viewer_id: Option<&str>,
        author_id: &str,
    ) -> Result<Vec<PostView>, AppError> {
        let sql = format!(
            "SELECT {POST_VIEW_COLUMNS} FROM posts p JOIN users u ON u.id = p.user_id \
             WHERE p.user_id = ? ORDER BY p.created_at DESC, p.rowid DESC"
        );
        let posts = sqlx::query_as::<_, PostView>(&sql)
            .bind(viewer_id)
            .bind(viewer_id)
            .bind(viewer_id)
            .bind(author_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(posts)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    pub async fn get_comment(&self, id: &str) -> Result<Option<Comment>, AppError> {
        let comment = sqlx::query_as::<_, Comment>(
            "SELECT id, user_id, post_id, content, likes_count, created_at FROM comments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(comment)
    }

    /// Comments on a post, newest first
    pub async fn get_comment_views(
        &self,
        viewer_id: Option<&str>,
        post_id: &str,
    ) -> Result<Vec<CommentView>, AppError> {
        let comments = sqlx::query_as::<_, CommentView>(
            r#"
            SELECT c.id, c.content, c.likes_count, c.created_at,
                   u.username AS author_username, u.avatar_url AS author_avatar_url,
                   (c.user_id IS ?) AS mine,
                   EXISTS (SELECT 1 FROM comment_likes l
                           WHERE l.comment_id = c.id AND l.user_id IS ?) AS liked
            FROM comments c JOIN users u ON u.id = c.user_id
            WHERE c.post_id = ?
            ORDER BY c.created_at DESC, c.rowid DESC
            "#,
        )
        .bind(viewer_id)
        .bind(viewer_id)
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    // =========================================================================
    // Feed
    // =========================================================================

    /// The owner's materialized feed, newest post first
    pub async fn get_feed(&self, owner_id: &str) -> Result<Vec<FeedItemView>, AppError> {
        let sql = format!(
            "SELECT f.id AS feed_id, {POST_VIEW_COLUMNS} FROM feed f \
             JOIN posts p ON p.id = f.post_id JOIN users u ON u.id = p.user_id \
             WHERE f.user_id = ? ORDER BY p.created_at DESC, p.rowid DESC"
        );
        let items = sqlx::query_as::<_, FeedItemView>(&sql)
            .bind(owner_id)
            .bind(owner_id)
            .bind(owner_id)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Feed rows referencing a post, ordered by owner
    pub async fn get_feed_entries_for_post(&self, post_id: &str) -> Result<Vec<FeedEntry>, AppError> {
        let entries = sqlx::query_as::<_, FeedEntry>(
            "SELECT id, user_id, post_id FROM feed WHERE post_id = ? ORDER BY user_id",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Notifications addressed to a user, newest first
    pub async fn get_notifications(&self, user_id: &str) -> Result<Vec<NotificationView>, AppError> {
        let notifications = sqlx::query_as::<_, NotificationView>(
            r#"
            SELECT n.id, n.user_id, n.actor_id, a.username AS actor_username, n.verb,
                   n.object_id, n.target_id, n.issued_at, n.read
            FROM notifications n JOIN users a ON a.id = n.actor_id
            WHERE n.user_id = ?
            ORDER BY n.issued_at DESC, n.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notifications)
    }

    /// Move the seen-at watermark up to a notification's issue time.
    ///
    /// Never moves the watermark backwards.
    pub async fn advance_notifications_seen_at(
        &self,
        user_id: &str,
        newest_notification_id: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET notifications_seen_at = (SELECT issued_at FROM notifications WHERE id = ?)
            WHERE id = ?
              AND (notifications_seen_at IS NULL
                   OR notifications_seen_at < (SELECT issued_at FROM notifications WHERE id = ?))
            "#,
        )
        .bind(newest_notification_id)
        .bind(user_id)
        .bind(newest_notification_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark one of the user's notifications read. `false` when no such notification.
    pub async fn mark_notification_read(
        &self,
        user_id: &str,
        notification_id: i64,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = ? AND user_id = ?")
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Whether the user has an unread notification issued after the watermark
    pub async fn has_unseen_notifications(&self, user_id: &str) -> Result<bool, AppError> {
        let unseen: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM notifications n JOIN users u ON u.id = n.user_id
                WHERE n.user_id = ?
                  AND n.read = 0
                  AND (u.notifications_seen_at IS NULL OR n.issued_at > u.notifications_seen_at)
            )
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(unseen)
    }

    // =========================================================================
    // Edge audit
    // =========================================================================

    /// Live number of `kind` edges pointing at `object_id`
    pub async fn count_edges(&self, kind: EdgeKind, object_id: &str) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        edges::count_for_object(&mut *conn, kind, object_id).await
    }

    /// Cached counter mirroring `count_edges(kind, object_id)`
    pub async fn counter_value(&self, kind: EdgeKind, object_id: &str) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        edges::read_counter(&mut *conn, kind.object_counter(), object_id).await
    }

    pub async fn edge_exists(
        &self,
        kind: EdgeKind,
        subject_id: &str,
        object_id: &str,
    ) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        Ok(edges::probe(&mut *conn, kind, subject_id, object_id)
            .await?
            .unwrap_or(false))
    }
}
