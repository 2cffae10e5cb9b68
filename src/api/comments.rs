//! Comment endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{CommentResponse, CreateCommentRequest, LikeToggleResponse};
use crate::AppState;
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::AppError;

/// POST /api/posts/:post_id/comments
pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), AppError> {
    let comment = state
        .comments
        .create_comment(&principal, &post_id, &req.content)
        .await?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}

/// GET /api/posts/:post_id/comments
pub async fn list_comments(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(post_id): Path<String>,
) -> Result<Json<Vec<CommentResponse>>, AppError> {
    let comments = state
        .comments
        .comments(viewer.principal(), &post_id)
        .await?;
    Ok(Json(comments.into_iter().map(CommentResponse::from).collect()))
}

/// POST /api/comments/:comment_id/toggle_like
pub async fn toggle_like(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(comment_id): Path<String>,
) -> Result<Json<LikeToggleResponse>, AppError> {
    let outcome = state.comments.toggle_like(&principal, &comment_id).await?;
    Ok(Json(outcome.into()))
}
