use axum::extract::Extension;

use crate::database::models::User;
use crate::handlers::db;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::auth_service::AuthService;

/// GET /api/auth/me - the authenticated user's profile
pub async fn me(Extension(user): Extension<AuthUser>) -> ApiResult<User> {
    let pool = db().await?;
    let profile = AuthService::new(pool).current_user(user.user_id).await?;
    Ok(ApiResponse::success(profile))
}
