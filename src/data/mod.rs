//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite connection pool and queries
//! - Serializable write transactions with conflict retry
//! - Relationship edges and their cached counters

mod database;
pub(crate) mod edges;
mod models;
pub(crate) mod transaction;
pub(crate) mod writes;

pub use database::Database;
pub use edges::EdgeKind;
pub use models::*;
pub use transaction::{RetryPolicy, TxFuture, is_transient};
