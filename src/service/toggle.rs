//! Membership toggle engine
//!
//! One protocol for every [`EdgeKind`]: look the edge up, flip it, move the
//! mirrored counters by one, and read the object counter back, all inside a
//! single serializable transaction.

use std::sync::Arc;

use sqlx::SqliteConnection;

use crate::data::edges;
use crate::data::{Database, EdgeKind};
use crate::error::AppError;

/// Result of a committed toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    /// Whether the edge exists after the toggle
    pub active: bool,
    /// Object counter after the toggle
    pub counter: i64,
}

pub struct ToggleEngine {
    db: Arc<Database>,
}

impl ToggleEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Flip the `kind` edge from `subject_id` to `object_id`.
    ///
    /// # Errors
    /// - `SelfReferenceRejected` for a follow whose subject and object match
    /// - `NotFound` when the object does not exist
    /// - `RetriesExhausted` when the transaction kept conflicting
    pub async fn toggle(
        &self,
        subject_id: &str,
        object_id: &str,
        kind: EdgeKind,
    ) -> Result<ToggleOutcome, AppError> {
        if kind.rejects_self_reference() && subject_id == object_id {
            return Err(AppError::SelfReferenceRejected);
        }

        let outcome = self
            .db
            .run_transaction(kind.as_str(), |conn| {
                let subject_id = subject_id.to_owned();
                let object_id = object_id.to_owned();
                Box::pin(async move { flip(conn, kind, &subject_id, &object_id).await })
            })
            .await?;

        let state = if outcome.active { "on" } else { "off" };
        crate::metrics::EDGE_TOGGLES_TOTAL
            .with_label_values(&[kind.as_str(), state])
            .inc();
        tracing::debug!(
            edge = kind.as_str(),
            subject_id,
            object_id,
            active = outcome.active,
            counter = outcome.counter,
            "Edge toggled"
        );

        Ok(outcome)
    }
}

async fn flip(
    conn: &mut SqliteConnection,
    kind: EdgeKind,
    subject_id: &str,
    object_id: &str,
) -> Result<ToggleOutcome, AppError> {
    let existed = edges::probe(&mut *conn, kind, subject_id, object_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let delta = if existed {
        edges::delete(&mut *conn, kind, subject_id, object_id).await?;
        -1
    } else {
        edges::insert(&mut *conn, kind, subject_id, object_id).await?;
        1
    };

    if let Some(subject_counter) = kind.subject_counter() {
        edges::adjust_counter(&mut *conn, subject_counter, subject_id, delta).await?;
    }
    let counter = edges::adjust_counter(&mut *conn, kind.object_counter(), object_id, delta).await?;

    Ok(ToggleOutcome {
        active: !existed,
        counter,
    })
}
