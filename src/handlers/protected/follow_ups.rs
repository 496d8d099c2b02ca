use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::{FollowUp, RuleEntity};
use crate::handlers::{audit, db, snapshot, trigger_rules, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::audit_service::MutationAction;
use crate::services::follow_up_service::{CreateFollowUpInput, FollowUpService, UpdateFollowUpInput};

const ENTITY: &str = "FollowUp";

#[derive(Debug, Default, Deserialize)]
pub struct FollowUpListQuery {
    #[serde(default)]
    pub pending: bool,
}

/// GET /api/followups?pending=true
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<FollowUpListQuery>,
) -> ApiResult<Vec<FollowUp>> {
    let pool = db().await?;
    let follow_ups = FollowUpService::new(pool).list(&user, query.pending).await?;
    Ok(ApiResponse::success(follow_ups))
}

/// GET /api/followups/today
pub async fn today(Extension(user): Extension<AuthUser>) -> ApiResult<Vec<FollowUp>> {
    let pool = db().await?;
    let follow_ups = FollowUpService::new(pool).today(&user, Utc::now()).await?;
    Ok(ApiResponse::success(follow_ups))
}

/// GET /api/followups/overdue
pub async fn overdue(Extension(user): Extension<AuthUser>) -> ApiResult<Vec<FollowUp>> {
    let pool = db().await?;
    let follow_ups = FollowUpService::new(pool).overdue_for(&user, Utc::now()).await?;
    Ok(ApiResponse::success(follow_ups))
}

/// POST /api/followups
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateFollowUpInput>, JsonRejection>,
) -> ApiResult<FollowUp> {
    let Json(input) = payload?;
    let pool = db().await?;
    let follow_up = FollowUpService::new(pool.clone()).create(&user, input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: follow_up.id,
            entity_name: Some(follow_up.title.clone()),
            old_data: None,
            new_data: snapshot(&follow_up),
            metadata: None,
        },
    )
    .await;
    trigger_rules(&pool, RuleEntity::FollowUp, follow_up.id, &follow_up);
    Ok(ApiResponse::created(follow_up))
}

/// GET /api/followups/:id
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<FollowUp> {
    let pool = db().await?;
    Ok(ApiResponse::success(FollowUpService::new(pool).get(&user, id).await?))
}

/// PUT /api/followups/:id
///
/// `completed: true` stamps `completedAt`, `completed: false` clears it.
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateFollowUpInput>, JsonRejection>,
) -> ApiResult<FollowUp> {
    let Json(patch) = payload?;
    let pool = db().await?;

    let (before, after) = FollowUpService::new(pool.clone()).update(&user, id, patch).await?;
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
    trigger_rules(&pool, RuleEntity::FollowUp, id, &after);
    Ok(ApiResponse::success(after))
}

/// PATCH /api/followups/:id/complete
pub async fn complete(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<FollowUp> {
    let pool = db().await?;
    Ok(ApiResponse::success(FollowUpService::new(pool).complete(&user, id).await?))
}

/// DELETE /api/followups/:id
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = db().await?;

    let follow_up = FollowUpService::new(pool.clone()).delete(&user, id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(follow_up.title.clone()),
            old_data: snapshot(&follow_up),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("Follow-up deleted successfully"))
}
