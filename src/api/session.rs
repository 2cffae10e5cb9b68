//! Login and logout

use axum::{extract::State, http::StatusCode, response::Json};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};

use super::dto::{LoginRequest, LoginResponse, ProfileResponse};
use crate::AppState;
use crate::auth::{CurrentUser, SESSION_COOKIE};
use crate::error::AppError;

/// POST /api/login
///
/// Returns the token in the body and also sets it as the session cookie.
/// The cookie lives for the browser session; the token carries its own expiry.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let grant = state.users.login(&req.email).await?;

    let cookie = Cookie::build((SESSION_COOKIE, grant.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);

    Ok((jar.add(cookie), Json(grant.into())))
}

/// POST /api/logout
pub async fn logout(jar: CookieJar) -> (CookieJar, StatusCode) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}

/// GET /api/me
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state.users.current(&principal).await?;
    Ok(Json(user.into()))
}
