use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::onboarding::{OnboardingForm, OnboardingFormListItem, OnboardingSubmission};
use crate::database::models::Client;
use crate::handlers::{audit, db, snapshot, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::audit_service::MutationAction;
use crate::services::onboarding_service::{
    CreateFormInput, OnboardingService, SubmissionListItem, UpdateFormInput,
};

const ENTITY: &str = "OnboardingForm";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    #[serde(default)]
    pub assigned_user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ConvertedSubmission {
    pub submission: OnboardingSubmission,
    pub client: Client,
}

/// GET /api/onboarding-forms
pub async fn list(Extension(user): Extension<AuthUser>) -> ApiResult<Vec<OnboardingFormListItem>> {
    let pool = db().await?;
    Ok(ApiResponse::success(OnboardingService::new(pool).list(&user).await?))
}

/// POST /api/onboarding-forms
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateFormInput>, JsonRejection>,
) -> ApiResult<OnboardingForm> {
    let Json(input) = payload?;
    let pool = db().await?;

    let form = OnboardingService::new(pool.clone()).create(&user, input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: form.id,
            entity_name: Some(form.title.clone()),
            old_data: None,
            new_data: snapshot(&form),
            metadata: None,
        },
    )
    .await;
    Ok(ApiResponse::created(form))
}

/// GET /api/onboarding-forms/:id
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<OnboardingForm> {
    let pool = db().await?;
    Ok(ApiResponse::success(OnboardingService::new(pool).get(&user, id).await?))
}

/// PUT /api/onboarding-forms/:id - partial update
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateFormInput>, JsonRejection>,
) -> ApiResult<OnboardingForm> {
    let Json(patch) = payload?;
    let pool = db().await?;

    let (before, after) = OnboardingService::new(pool.clone()).update(&user, id, patch).await?;
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

/// DELETE /api/onboarding-forms/:id
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = db().await?;

    let form = OnboardingService::new(pool.clone()).delete(&user, id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(form.title.clone()),
            old_data: snapshot(&form),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("Form deleted successfully"))
}

/// GET /api/onboarding-forms/:id/submissions
pub async fn form_submissions(
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<OnboardingSubmission>> {
    let pool = db().await?;
    let submissions = OnboardingService::new(pool).submissions_for_form(&user, id).await?;
    Ok(ApiResponse::success(submissions))
}

/// GET /api/onboarding-forms/submissions - submissions across visible forms
pub async fn all_submissions(Extension(user): Extension<AuthUser>) -> ApiResult<Vec<SubmissionListItem>> {
    let pool = db().await?;
    Ok(ApiResponse::success(OnboardingService::new(pool).all_submissions(&user).await?))
}

/// POST /api/onboarding-forms/submissions/:submission_id/create-client
///
/// The body is optional; `assignedUserId` defaults to the caller.
pub async fn create_client(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(submission_id): Path<Uuid>,
    payload: Option<Json<CreateClientRequest>>,
) -> ApiResult<ConvertedSubmission> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let pool = db().await?;

    let (submission, client) = OnboardingService::new(pool.clone())
        .create_client_from_submission(&user, submission_id, request.assigned_user_id)
        .await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: "Client",
            entity_id: client.id,
            entity_name: Some(client.contact_name.clone()),
            old_data: None,
            new_data: snapshot(&client),
            metadata: Some(serde_json::json!({ "submissionId": submission_id })),
        },
    )
    .await;
    Ok(ApiResponse::created(ConvertedSubmission { submission, client }))
}
