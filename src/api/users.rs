//! User endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{
    CreateUserRequest, FollowToggleResponse, PostResponse, ProfileResponse, SearchParams,
};
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::AppError;

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ProfileResponse>), AppError> {
    let user = state.users.create_user(&req.email, &req.username).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /api/users?search=
pub async fn search_users(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ProfileResponse>>, AppError> {
    let query = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| AppError::Validation("search query required".to_string()))?;

    let principal = viewer.principal();
    let profiles = state.users.search(principal, query).await?;
    let viewer_id = principal.map(|p| p.user_id.as_str());

    Ok(Json(
        profiles
            .into_iter()
            .map(|view| ProfileResponse::from_view(view, viewer_id))
            .collect(),
    ))
}

/// GET /api/users/:username
pub async fn get_user(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(username): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let principal = viewer.principal();
    let view = state.users.profile(principal, &username).await?;
    Ok(Json(ProfileResponse::from_view(
        view,
        principal.map(|p| p.user_id.as_str()),
    )))
}

/// POST /api/users/:username/toggle_follow
pub async fn toggle_follow(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(username): Path<String>,
) -> Result<Json<FollowToggleResponse>, AppError> {
    let toggle = state.users.toggle_follow(&principal, &username).await?;
    Ok(Json(toggle.into()))
}

/// GET /api/users/:username/posts
pub async fn user_posts(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(username): Path<String>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let posts = state
        .posts
        .posts_by_user(viewer.principal(), &username)
        .await?;
    Ok(Json(posts.into_iter().map(PostResponse::from).collect()))
}
