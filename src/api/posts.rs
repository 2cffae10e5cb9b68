//! Post endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{
    CreatePostRequest, FeedEntryResponse, LikeToggleResponse, PostResponse,
    SubscriptionToggleResponse,
};
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::AppError;

/// POST /api/posts
///
/// Returns the author's own feed entry for the new post.
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<FeedEntryResponse>), AppError> {
    let item = state
        .posts
        .create_post(&principal, &req.content, req.spoiler_of.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(FeedEntryResponse::new(&principal.user_id, item)),
    ))
}

/// GET /api/posts/:post_id
pub async fn get_post(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(post_id): Path<String>,
) -> Result<Json<PostResponse>, AppError> {
    let post = state.posts.get_post(viewer.principal(), &post_id).await?;
    Ok(Json(post.into()))
}

/// POST /api/posts/:post_id/toggle_like
pub async fn toggle_like(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Json<LikeToggleResponse>, AppError> {
    let outcome = state.posts.toggle_like(&principal, &post_id).await?;
    Ok(Json(outcome.into()))
}

/// POST /api/posts/:post_id/toggle_subscription
pub async fn toggle_subscription(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(post_id): Path<String>,
) -> Result<Json<SubscriptionToggleResponse>, AppError> {
    let outcome = state
        .posts
        .toggle_subscription(&principal, &post_id)
        .await?;
    Ok(Json(outcome.into()))
}
