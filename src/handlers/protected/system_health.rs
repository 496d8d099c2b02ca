use axum::extract::Extension;
use chrono::Utc;

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::system_health_service::{HealthReport, SystemHealthService};

/// GET /api/system-health - ADMIN; metrics are reported even when the database is down
pub async fn report(Extension(user): Extension<AuthUser>) -> ApiResult<HealthReport> {
    user.require_admin()?;
    let report = SystemHealthService::connect().await.report(Utc::now()).await;
    Ok(ApiResponse::success(report))
}
