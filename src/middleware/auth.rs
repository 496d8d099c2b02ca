use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::auth::{self, Claims};
use crate::database::models::UserRole;
use crate::error::ApiError;
use crate::services::error::ServiceError;

pub const TOKEN_COOKIE: &str = "token";

/// Authenticated user context extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
            role: claims.role,
        }
    }
}

impl AuthUser {
    /// Reject unless the caller holds one of `roles`
    pub fn require_role(&self, roles: &[UserRole]) -> Result<(), ApiError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            tracing::warn!(user_id = %self.user_id, role = ?self.role, "role check failed");
            Err(ApiError::forbidden("Forbidden: Insufficient permissions"))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        self.require_role(&[UserRole::Admin])
    }

    pub fn require_privileged(&self) -> Result<(), ApiError> {
        self.require_role(&[UserRole::Admin, UserRole::Manager])
    }

    /// ADMIN or MANAGER
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Manager)
    }

    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.is_privileged() || owner_id == self.user_id
    }

    /// Ownership check used by the services
    pub fn ensure_access(&self, owner_id: Uuid) -> Result<(), ServiceError> {
        if self.can_access(owner_id) {
            Ok(())
        } else {
            Err(ServiceError::forbidden())
        }
    }

    /// Owner filter for list queries: `None` means every row is visible
    pub fn owner_scope(&self) -> Option<Uuid> {
        if self.is_privileged() {
            None
        } else {
            Some(self.user_id)
        }
    }
}

/// JWT authentication middleware that validates tokens and extracts user context
pub async fn jwt_auth_middleware(
    headers: HeaderMap,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match extract_token(&headers, &jar) {
        Some(token) => token,
        None => {
            return ApiError::unauthorized("Unauthorized").into_response();
        }
    };

    let claims = match auth::verify_token(&token) {
        Ok(claims) => claims,
        Err(e) => {
            tracing::warn!("Rejected token: {}", e);
            return ApiError::unauthorized("Unauthorized").into_response();
        }
    };

    // Convert claims to AuthUser and inject into request
    request.extensions_mut().insert(AuthUser::from(claims));

    next.run(request).await
}

/// Bearer header first, then the `token` cookie
pub fn extract_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }

    jar.get(TOKEN_COOKIE)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
