use axum::extract::{Extension, Path, Query};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::Notification;
use crate::handlers::db;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::notification_service::NotificationService;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// GET /api/notifications?unreadOnly=true - newest 50 for the caller
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<NotificationListQuery>,
) -> ApiResult<Vec<Notification>> {
    let pool = db().await?;
    let notifications = NotificationService::new(pool)
        .list_for_user(user.user_id, query.unread_only)
        .await?;
    Ok(ApiResponse::success(notifications))
}

/// PATCH /api/notifications/:id - mark read
pub async fn mark_read(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<Notification> {
    let pool = db().await?;
    let notification = NotificationService::new(pool).mark_read(id, user.user_id).await?;
    Ok(ApiResponse::success(notification))
}
