//! Transaction boundary
//!
//! Every multi-statement mutation runs through [`run`]. The body executes on a
//! single pooled connection inside `BEGIN IMMEDIATE … COMMIT`, which takes the
//! SQLite write lock up front and makes the transaction serializable. When the
//! lock cannot be taken (or the commit is refused) the whole body is executed
//! again after a jittered exponential backoff, up to `max_attempts` times.
//!
//! Because a body may run more than once it must only touch the store: no
//! network calls, no channel sends, no broadcasts.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use rand::Rng;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::config::TransactionConfig;
use crate::error::AppError;

/// Boxed future returned by a transaction body
pub type TxFuture<'c, T> = BoxFuture<'c, Result<T, AppError>>;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Bounded retry policy for conflicting transactions
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TransactionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Delay before the attempt following `failed_attempt` (1-based).
    ///
    /// Half of the exponential step is fixed, the other half is random.
    fn backoff(&self, failed_attempt: u32) -> Duration {
        let shift = failed_attempt.saturating_sub(1).min(16);
        let step = self
            .base_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff);
        let half = step / 2;
        let jitter_us = rand::thread_rng().gen_range(0..=half.as_micros() as u64);
        half + Duration::from_micros(jitter_us)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(200),
        }
    }
}

/// Whether an error is a lock conflict that a fresh attempt can resolve.
pub fn is_transient(error: &AppError) -> bool {
    match error {
        AppError::Database(sqlx::Error::Database(db_error)) => db_error
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

/// Run `body` as one serializable transaction, retrying transient conflicts.
///
/// # Errors
/// - `RetriesExhausted` once `policy.max_attempts` attempts all conflicted
/// - any other error from the body or the store, unmodified
pub(crate) async fn run<T, F>(
    pool: &SqlitePool,
    policy: &RetryPolicy,
    label: &'static str,
    mut body: F,
) -> Result<T, AppError>
where
    T: Send,
    F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match run_once(pool, &mut body).await {
            Ok(value) => {
                crate::metrics::observe_transaction(label, started.elapsed());
                if attempt > 1 {
                    tracing::debug!(label, attempt, "Transaction committed after retry");
                }
                return Ok(value);
            }
            Err(error) if is_transient(&error) => {
                if attempt >= policy.max_attempts {
                    crate::metrics::TX_EXHAUSTED_TOTAL
                        .with_label_values(&[label])
                        .inc();
                    tracing::warn!(label, attempt, %error, "Giving up on conflicting transaction");
                    return Err(AppError::RetriesExhausted {
                        label,
                        attempts: attempt,
                    });
                }

                crate::metrics::TX_RETRIES_TOTAL
                    .with_label_values(&[label])
                    .inc();
                let delay = policy.backoff(attempt);
                tracing::debug!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Transient conflict, retrying transaction"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

async fn run_once<T, F>(pool: &SqlitePool, body: &mut F) -> Result<T, AppError>
where
    T: Send,
    F: for<'c> FnMut(&'c mut SqliteConnection) -> TxFuture<'c, T> + Send,
{
    let mut tx = TxConnection::new(pool.acquire().await?);

    let begun = sqlx::query("BEGIN IMMEDIATE").execute(tx.get()?).await;
    if let Err(error) = begun {
        // Nothing was started, the connection is clean.
        tx.release();
        return Err(error.into());
    }

    let result = body(tx.get()?).await;

    let committed = match result {
        Ok(value) => sqlx::query("COMMIT").execute(tx.get()?).await.map(|_| value),
        Err(error) => {
            rollback(tx).await;
            return Err(error);
        }
    };

    match committed {
        Ok(value) => {
            tx.release();
            Ok(value)
        }
        Err(error) => {
            rollback(tx).await;
            Err(error.into())
        }
    }
}

async fn rollback(mut tx: TxConnection) {
    let outcome = match tx.get() {
        Ok(conn) => sqlx::query("ROLLBACK").execute(conn).await.map(drop),
        Err(_) => return,
    };
    match outcome {
        Ok(()) => tx.release(),
        // Dropping the guard discards the connection.
        Err(error) => tracing::warn!(%error, "Rollback failed, discarding connection"),
    }
}

/// Pooled connection carrying an open transaction.
///
/// Goes back to the pool only through [`TxConnection::release`], after the
/// transaction was committed or rolled back. If the owning future is dropped
/// first (client disconnect, timeout) the connection is detached and closed,
/// which makes SQLite roll the transaction back and free the write lock.
struct TxConnection {
    conn: Option<PoolConnection<Sqlite>>,
}

impl TxConnection {
    fn new(conn: PoolConnection<Sqlite>) -> Self {
        Self { conn: Some(conn) }
    }

    fn get(&mut self) -> Result<&mut SqliteConnection, AppError> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("transaction connection already released")))
    }

    fn release(mut self) {
        drop(self.conn.take());
    }
}

impl Drop for TxConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!("Transaction abandoned before completion, closing its connection");
            drop(conn.detach());
        }
    }
}
