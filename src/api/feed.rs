//! Feed and notification endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{FeedEntryResponse, MarkedResponse, NotificationResponse, UnreadResponse};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// GET /api/feed
pub async fn get_feed(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<Vec<FeedEntryResponse>>, AppError> {
    let items = state.feed.feed(&principal).await?;
    Ok(Json(
        items
            .into_iter()
            .map(|item| FeedEntryResponse::new(&principal.user_id, item))
            .collect(),
    ))
}

/// GET /api/notifications
pub async fn get_notifications(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<Vec<NotificationResponse>>, AppError> {
    let notifications = state.notifications.list(&principal).await?;
    Ok(Json(
        notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    ))
}

/// POST /api/notifications/:id/mark_as_read
pub async fn mark_as_read(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
    Path(notification_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state
        .notifications
        .mark_as_read(&principal, notification_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/mark_notifications_as_read
pub async fn mark_all_as_read(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<MarkedResponse>, AppError> {
    let updated = state.notifications.mark_all_as_read(&principal).await?;
    Ok(Json(MarkedResponse { updated }))
}

/// GET /api/check_unread_notifications
pub async fn check_unread(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<Json<UnreadResponse>, AppError> {
    let unread = state.notifications.has_unseen(&principal).await?;
    Ok(Json(UnreadResponse { unread }))
}
