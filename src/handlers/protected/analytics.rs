use axum::extract::{Extension, Query};
use chrono::Utc;

use crate::error::ApiError;
use crate::handlers::db;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::analytics_service::{
    AnalyticsService, Period, PeriodQuery, RecruiterComparison, RecruiterMetrics, SystemMetrics,
};

fn period(query: &PeriodQuery) -> Result<Period, ApiError> {
    Ok(Period::resolve(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        Utc::now(),
    )?)
}

/// GET /api/analytics/recruiter-metrics?startDate=&endDate=&recruiterId=
///
/// `recruiterId` is honoured for ADMIN/MANAGER only; everyone else gets their own figures.
pub async fn recruiter_metrics(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<RecruiterMetrics> {
    let period = period(&query)?;
    let recruiter_id = match query.recruiter_id {
        Some(id) if user.is_privileged() => id,
        _ => user.user_id,
    };
    let pool = db().await?;
    let metrics = AnalyticsService::new(pool).recruiter_metrics(recruiter_id, period).await?;
    Ok(ApiResponse::success(metrics))
}

/// GET /api/analytics/system-metrics - ADMIN or MANAGER
pub async fn system_metrics(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<SystemMetrics> {
    user.require_privileged()?;
    let period = period(&query)?;
    let pool = db().await?;
    Ok(ApiResponse::success(AnalyticsService::new(pool).system_metrics(period).await?))
}

/// GET /api/analytics/recruiter-comparison - ADMIN or MANAGER
pub async fn recruiter_comparison(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PeriodQuery>,
) -> ApiResult<Vec<RecruiterComparison>> {
    user.require_privileged()?;
    let period = period(&query)?;
    let pool = db().await?;
    let comparison = AnalyticsService::new(pool).recruiter_comparison(period).await?;
    Ok(ApiResponse::success(comparison))
}
