//! Authentication extractors
//!
//! Turn a session token into the [`Principal`] handed to service calls.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use axum_extra::extract::CookieJar;

use super::session::{Principal, verify_session_token};
use crate::AppState;
use crate::error::AppError;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_owned())
        })
}

fn authenticate(parts: &mut Parts, state: &AppState) -> Result<Principal, AppError> {
    if let Some(principal) = parts.extensions.get::<Principal>().cloned() {
        return Ok(principal);
    }

    let token = extract_token_from_headers(&parts.headers).ok_or(AppError::Unauthorized)?;
    let principal = verify_session_token(&token, &state.config.auth.session_secret)?.principal();
    parts.extensions.insert(principal.clone());

    Ok(principal)
}

/// Extractor for the authenticated principal
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(principal): CurrentUser) -> impl IntoResponse {
///     principal.user_id
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        authenticate(parts, &state).map(CurrentUser)
    }
}

/// Optional principal extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Principal>);

impl MaybeUser {
    pub fn principal(&self) -> Option<&Principal> {
        self.0.as_ref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(MaybeUser(authenticate(parts, &state).ok()))
    }
}
