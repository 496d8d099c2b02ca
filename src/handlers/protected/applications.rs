use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::{Application, ApplicationStage, RuleEntity};
use crate::handlers::{audit, db, snapshot, trigger_rules, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::application_service::{
    ApplicationService, CreateApplicationInput, UpdateApplicationInput,
};
use crate::services::audit_service::MutationAction;

const ENTITY: &str = "Application";

#[derive(Debug, Deserialize)]
pub struct ApplicationListQuery {
    pub stage: Option<ApplicationStage>,
}

/// GET /api/applications?stage=
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ApplicationListQuery>,
) -> ApiResult<Vec<Application>> {
    let pool = db().await?;
    let applications = ApplicationService::new(pool).list(&user, query.stage).await?;
    Ok(ApiResponse::success(applications))
}

/// GET /api/applications/stage/:stage
pub async fn by_stage(
    Extension(user): Extension<AuthUser>,
    Path(stage): Path<ApplicationStage>,
) -> ApiResult<Vec<Application>> {
    let pool = db().await?;
    let applications = ApplicationService::new(pool).list(&user, Some(stage)).await?;
    Ok(ApiResponse::success(applications))
}

/// POST /api/applications
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateApplicationInput>, JsonRejection>,
) -> ApiResult<Application> {
    let Json(input) = payload?;
    let pool = db().await?;

    let application = ApplicationService::new(pool.clone()).create(&user, input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: application.id,
            entity_name: None,
            old_data: None,
            new_data: snapshot(&application),
            metadata: None,
        },
    )
    .await;
    trigger_rules(&pool, RuleEntity::Application, application.id, &application);
    Ok(ApiResponse::created(application))
}

/// GET /api/applications/:id
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<Application> {
    let pool = db().await?;
    Ok(ApiResponse::success(ApplicationService::new(pool).get(&user, id).await?))
}

/// PUT /api/applications/:id - stage, notes and followUpDate
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateApplicationInput>, JsonRejection>,
) -> ApiResult<Application> {
    let Json(patch) = payload?;
    let pool = db().await?;

    let (before, after) = ApplicationService::new(pool.clone()).update(&user, id, patch).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: ENTITY,
            entity_id: id,
            entity_name: None,
            old_data: snapshot(&before),
            new_data: snapshot(&after),
            metadata: None,
        },
    )
    .await;
    trigger_rules(&pool, RuleEntity::Application, id, &after);
    Ok(ApiResponse::success(after))
}

/// DELETE /api/applications/:id
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = db().await?;

    let application = ApplicationService::new(pool.clone()).delete(&user, id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: ENTITY,
            entity_id: id,
            entity_name: None,
            old_data: snapshot(&application),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("Application deleted successfully"))
}
