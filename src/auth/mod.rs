//! Authentication
//!
//! Handles:
//! - Signed session tokens
//! - Principal extractors for handlers

mod middleware;
pub mod session;

pub use middleware::{CurrentUser, MaybeUser, SESSION_COOKIE};
pub use session::{Principal, Session, create_session_token, verify_session_token};
