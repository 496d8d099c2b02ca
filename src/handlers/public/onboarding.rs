use axum::{
    extract::{rejection::JsonRejection, Path},
    Json,
};
use uuid::Uuid;

use crate::database::models::onboarding::{OnboardingSubmission, PublicForm};
use crate::handlers::db;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::onboarding_service::{OnboardingService, SubmitFormInput};

/// GET /api/onboarding-forms/:id/public - form definition for candidates
pub async fn public_view(Path(id): Path<Uuid>) -> ApiResult<PublicForm> {
    let pool = db().await?;
    let form = OnboardingService::new(pool).public_view(id).await?;
    Ok(ApiResponse::success(form))
}

/// POST /api/onboarding-forms/:id/submit - store a candidate's answers
pub async fn submit(
    Path(id): Path<Uuid>,
    payload: Result<Json<SubmitFormInput>, JsonRejection>,
) -> ApiResult<OnboardingSubmission> {
    let Json(input) = payload?;
    let pool = db().await?;
    let submission = OnboardingService::new(pool).submit(id, input).await?;
    Ok(ApiResponse::created(submission))
}
