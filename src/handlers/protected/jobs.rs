use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::Job;
use crate::handlers::{audit, db, snapshot, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::audit_service::MutationAction;
use crate::services::job_service::{
    BulkCreateJobsInput, BulkCreateResult, CreateJobInput, JobService, UpdateJobInput,
};

const ENTITY: &str = "Job";

fn job_name(job: &Job) -> Option<String> {
    Some(format!("{} at {}", job.title, job.company))
}

/// GET /api/jobs - own jobs, or every job for ADMIN/MANAGER
pub async fn list(Extension(user): Extension<AuthUser>) -> ApiResult<Vec<Job>> {
    let pool = db().await?;
    Ok(ApiResponse::success(JobService::new(pool).list(&user).await?))
}

/// POST /api/jobs
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateJobInput>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(input) = payload?;
    let pool = db().await?;

    let job = JobService::new(pool.clone()).create(&user, input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: job.id,
            entity_name: job_name(&job),
            old_data: None,
            new_data: snapshot(&job),
            metadata: None,
        },
    )
    .await;
    Ok(ApiResponse::created(job))
}

/// POST /api/jobs/bulk - scraped jobs from the extension; duplicate URLs are skipped
pub async fn bulk_create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<BulkCreateJobsInput>, JsonRejection>,
) -> ApiResult<BulkCreateResult> {
    let Json(input) = payload?;
    let submitted = input.jobs.len();
    let pool = db().await?;

    let result = JobService::new(pool.clone()).bulk_create(&user, input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: user.user_id,
            entity_name: Some("Bulk import".to_string()),
            old_data: None,
            new_data: None,
            metadata: Some(json!({ "submitted": submitted, "created": result.count })),
        },
    )
    .await;
    Ok(ApiResponse::created(result))
}

/// GET /api/jobs/:id
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<Job> {
    let pool = db().await?;
    Ok(ApiResponse::success(JobService::new(pool).get(&user, id).await?))
}

/// PUT /api/jobs/:id - partial update
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateJobInput>, JsonRejection>,
) -> ApiResult<Job> {
    let Json(patch) = payload?;
    let pool = db().await?;

    let (before, after) = JobService::new(pool.clone()).update(&user, id, patch).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: ENTITY,
            entity_id: id,
            entity_name: job_name(&after),
            old_data: snapshot(&before),
            new_data: snapshot(&after),
            metadata: None,
        },
    )
    .await;
    Ok(ApiResponse::success(after))
}

/// DELETE /api/jobs/:id
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = db().await?;

    let job = JobService::new(pool.clone()).delete(&user, id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: ENTITY,
            entity_id: id,
            entity_name: job_name(&job),
            old_data: snapshot(&job),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("Job deleted successfully"))
}
