//! Relationship edges and the counters that mirror them
//!
//! Each [`EdgeKind`] is a pair table plus one or two denormalized counter
//! columns. The helpers here run on a connection that is already inside a
//! transaction; callers are responsible for keeping edge and counter writes
//! in the same one.

use sqlx::SqliteConnection;

use crate::error::AppError;

/// A counter column keyed by the row's `id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterColumn {
    pub table: &'static str,
    pub column: &'static str,
}

pub const USER_FOLLOWERS: CounterColumn = CounterColumn {
    table: "users",
    column: "followers_count",
};
pub const USER_FOLLOWING: CounterColumn = CounterColumn {
    table: "users",
    column: "following_count",
};
pub const POST_LIKES: CounterColumn = CounterColumn {
    table: "posts",
    column: "likes_count",
};
pub const POST_COMMENTS: CounterColumn = CounterColumn {
    table: "posts",
    column: "comments_count",
};
pub const POST_SUBSCRIBERS: CounterColumn = CounterColumn {
    table: "posts",
    column: "subscribers_count",
};
pub const COMMENT_LIKES: CounterColumn = CounterColumn {
    table: "comments",
    column: "likes_count",
};

/// Toggleable relationship between a user and an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// user follows user
    Follow,
    /// user likes post
    PostLike,
    /// user likes comment
    CommentLike,
    /// user subscribes to a post's comment thread
    Subscription,
}

struct EdgeSchema {
    table: &'static str,
    subject_column: &'static str,
    object_column: &'static str,
    object_counter: CounterColumn,
    subject_counter: Option<CounterColumn>,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 4] = [
        EdgeKind::Follow,
        EdgeKind::PostLike,
        EdgeKind::CommentLike,
        EdgeKind::Subscription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::PostLike => "post_like",
            Self::CommentLike => "comment_like",
            Self::Subscription => "subscription",
        }
    }

    fn schema(&self) -> EdgeSchema {
        match self {
            Self::Follow => EdgeSchema {
                table: "follows",
                subject_column: "follower_id",
                object_column: "following_id",
                object_counter: USER_FOLLOWERS,
                subject_counter: Some(USER_FOLLOWING),
            },
            Self::PostLike => EdgeSchema {
                table: "post_likes",
                subject_column: "user_id",
                object_column: "post_id",
                object_counter: POST_LIKES,
                subject_counter: None,
            },
            Self::CommentLike => EdgeSchema {
                table: "comment_likes",
                subject_column: "user_id",
                object_column: "comment_id",
                object_counter: COMMENT_LIKES,
                subject_counter: None,
            },
            Self::Subscription => EdgeSchema {
                table: "subscriptions",
                subject_column: "user_id",
                object_column: "post_id",
                object_counter: POST_SUBSCRIBERS,
                subject_counter: None,
            },
        }
    }

    /// Counter on the object row that equals the number of edges pointing at it
    pub fn object_counter(&self) -> CounterColumn {
        self.schema().object_counter
    }

    /// Counter on the subject row, when the edge kind keeps one
    pub fn subject_counter(&self) -> Option<CounterColumn> {
        self.schema().subject_counter
    }

    /// Only follows point at the same kind of row as their subject.
    pub fn rejects_self_reference(&self) -> bool {
        matches!(self, Self::Follow)
    }
}

/// Look up whether the edge exists.
///
/// Returns `None` when the object row does not exist, so callers can tell a
/// missing target apart from an absent edge in one round trip.
pub async fn probe(
    conn: &mut SqliteConnection,
    kind: EdgeKind,
    subject_id: &str,
    object_id: &str,
) -> Result<Option<bool>, AppError> {
    let schema = kind.schema();
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM {table} WHERE {subject} = ? AND {object} = ?) \
         FROM {object_table} WHERE id = ?",
        table = schema.table,
        subject = schema.subject_column,
        object = schema.object_column,
        object_table = schema.object_counter.table,
    );

    let exists = sqlx::query_scalar::<_, bool>(&sql)
        .bind(subject_id)
        .bind(object_id)
        .bind(object_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(exists)
}

/// Insert an edge. Fails on a duplicate pair.
pub async fn insert(
    conn: &mut SqliteConnection,
    kind: EdgeKind,
    subject_id: &str,
    object_id: &str,
) -> Result<(), AppError> {
    let schema = kind.schema();
    let sql = format!(
        "INSERT INTO {} ({}, {}) VALUES (?, ?)",
        schema.table, schema.subject_column, schema.object_column
    );

    sqlx::query(&sql)
        .bind(subject_id)
        .bind(object_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Delete an edge, returning whether a row was removed.
pub async fn delete(
    conn: &mut SqliteConnection,
    kind: EdgeKind,
    subject_id: &str,
    object_id: &str,
) -> Result<bool, AppError> {
    let schema = kind.schema();
    let sql = format!(
        "DELETE FROM {} WHERE {} = ? AND {} = ?",
        schema.table, schema.subject_column, schema.object_column
    );

    let result = sqlx::query(&sql)
        .bind(subject_id)
        .bind(object_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Add `delta` to a counter and return the new value.
pub async fn adjust_counter(
    conn: &mut SqliteConnection,
    counter: CounterColumn,
    row_id: &str,
    delta: i64,
) -> Result<i64, AppError> {
    let sql = format!(
        "UPDATE {table} SET {column} = {column} + ? WHERE id = ? RETURNING {column}",
        table = counter.table,
        column = counter.column,
    );

    sqlx::query_scalar::<_, i64>(&sql)
        .bind(delta)
        .bind(row_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound)
}

/// Number of edges of `kind` pointing at `object_id`
pub async fn count_for_object(
    conn: &mut SqliteConnection,
    kind: EdgeKind,
    object_id: &str,
) -> Result<i64, AppError> {
    let schema = kind.schema();
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = ?",
        schema.table, schema.object_column
    );

    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(object_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count)
}

/// Current value of a counter column
pub async fn read_counter(
    conn: &mut SqliteConnection,
    counter: CounterColumn,
    row_id: &str,
) -> Result<i64, AppError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?",
        counter.column, counter.table
    );

    sqlx::query_scalar::<_, i64>(&sql)
        .bind(row_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AppError::NotFound)
}
