use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::HeaderMap,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::Activity;
use crate::handlers::{audit, db, snapshot, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::activity_service::{
    ActivityFilter, ActivityService, CreateActivityInput, UpdateActivityInput,
};
use crate::services::audit_service::MutationAction;

const ENTITY: &str = "Activity";

/// GET /api/activities?leadId=&clientId=&assignedUserId=
///
/// Recruiters only see activities assigned to them.
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(filter): Query<ActivityFilter>,
) -> ApiResult<Vec<Activity>> {
    let pool = db().await?;
    let activities = ActivityService::new(pool)
        .list(&filter, user.owner_scope())
        .await?;
    Ok(ApiResponse::success(activities))
}

/// POST /api/activities
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateActivityInput>, JsonRejection>,
) -> ApiResult<Activity> {
    let Json(input) = payload?;
    let pool = db().await?;

    let activity = ActivityService::new(pool.clone()).log(&user, input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: activity.id,
            entity_name: Some(activity.title.clone()),
            old_data: None,
            new_data: snapshot(&activity),
            metadata: None,
        },
    )
    .await;
    Ok(ApiResponse::created(activity))
}

/// GET /api/activities/:id
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<Activity> {
    let pool = db().await?;
    Ok(ApiResponse::success(ActivityService::new(pool).get(&user, id).await?))
}

/// PUT /api/activities/:id
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateActivityInput>, JsonRejection>,
) -> ApiResult<Activity> {
    let Json(patch) = payload?;
    let pool = db().await?;

    let (before, after) = ActivityService::new(pool.clone()).update(&user, id, patch).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(after.title.clone()),
            old_data: snapshot(&before),
            new_data: snapshot(&after),
            metadata: None,
        },
    )
    .await;
    Ok(ApiResponse::success(after))
}

/// DELETE /api/activities/:id
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = db().await?;

    let activity = ActivityService::new(pool.clone()).delete(&user, id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(activity.title.clone()),
            old_data: snapshot(&activity),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("Activity deleted successfully"))
}
