use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::{AutomationRule, RuleEntity};
use crate::handlers::{audit, db, snapshot, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::audit_service::MutationAction;
use crate::services::rules::{CreateRuleInput, RuleFilter, RuleService, SweepResult, UpdateRuleInput};

const ENTITY: &str = "AutomationRule";

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct EvaluateRequest {
    /// Sweep a single entity type instead of all of them
    #[serde(default)]
    pub entity: Option<RuleEntity>,
}

/// GET /api/rules?entity=&enabled= - ADMIN or MANAGER
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(filter): Query<RuleFilter>,
) -> ApiResult<Vec<AutomationRule>> {
    user.require_privileged()?;
    let pool = db().await?;
    Ok(ApiResponse::success(RuleService::new(pool).list(&filter).await?))
}

/// POST /api/rules - ADMIN
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateRuleInput>, JsonRejection>,
) -> ApiResult<AutomationRule> {
    user.require_admin()?;
    let Json(input) = payload?;
    let pool = db().await?;

    let rule = RuleService::new(pool.clone()).create(user.user_id, input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: rule.id,
            entity_name: Some(rule.name.clone()),
            old_data: None,
            new_data: snapshot(&rule),
            metadata: None,
        },
    )
    .await;
    Ok(ApiResponse::created(rule))
}

/// GET /api/rules/:id - ADMIN or MANAGER
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<AutomationRule> {
    user.require_privileged()?;
    let pool = db().await?;
    Ok(ApiResponse::success(RuleService::new(pool).get(id).await?))
}

/// PUT /api/rules/:id - ADMIN
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateRuleInput>, JsonRejection>,
) -> ApiResult<AutomationRule> {
    user.require_admin()?;
    let Json(patch) = payload?;
    let pool = db().await?;

    let (before, after) = RuleService::new(pool.clone()).update(id, patch).await?;
    audit_update(&pool, &headers, &user, &before, &after).await;
    Ok(ApiResponse::success(after))
}

/// PATCH /api/rules/:id/toggle - ADMIN
pub async fn toggle(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> ApiResult<AutomationRule> {
    user.require_admin()?;
    let Json(request) = payload?;
    let pool = db().await?;

    let (before, after) = RuleService::new(pool.clone()).toggle(id, request.enabled).await?;
    audit_update(&pool, &headers, &user, &before, &after).await;
    Ok(ApiResponse::success(after))
}

/// DELETE /api/rules/:id - ADMIN
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    user.require_admin()?;
    let pool = db().await?;

    let rule = RuleService::new(pool.clone()).delete(id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(rule.name.clone()),
            old_data: snapshot(&rule),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("Rule deleted successfully"))
}

/// POST /api/rules/evaluate - ADMIN; sweeps open entities now
pub async fn evaluate(
    Extension(user): Extension<AuthUser>,
    payload: Option<Json<EvaluateRequest>>,
) -> ApiResult<Vec<SweepResult>> {
    user.require_admin()?;
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let pool = db().await?;
    let service = RuleService::new(pool);
    let now = Utc::now();

    let results = match request.entity {
        Some(entity) => vec![service.evaluate_entity_type(entity, now).await?],
        None => service.evaluate_all(now).await?,
    };
    Ok(ApiResponse::success(results))
}

async fn audit_update(
    pool: &sqlx::PgPool,
    headers: &HeaderMap,
    user: &AuthUser,
    before: &AutomationRule,
    after: &AutomationRule,
) {
    audit(
        pool,
        headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: ENTITY,
            entity_id: after.id,
            entity_name: Some(after.name.clone()),
            old_data: snapshot(before),
            new_data: snapshot(after),
            metadata: None,
        },
    )
    .await;
}
