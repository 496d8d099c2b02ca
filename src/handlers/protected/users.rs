use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::models::user::{User, UserListItem, UserRole};
use crate::handlers::{audit, db, snapshot, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::audit_service::MutationAction;
use crate::services::users_service::{CreateUserInput, UpdateUserInput, UsersService};

const ENTITY: &str = "User";

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub new_password: String,
}

/// GET /api/users?role= - every user with manager and ownership counts
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Vec<UserListItem>> {
    user.require_admin()?;
    let pool = db().await?;
    let users = UsersService::new(pool).list(query.role).await?;
    Ok(ApiResponse::success(users))
}

/// GET /api/users/:id
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<User> {
    user.require_admin()?;
    let pool = db().await?;
    Ok(ApiResponse::success(UsersService::new(pool).get(id).await?))
}

/// POST /api/users
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateUserInput>, JsonRejection>,
) -> ApiResult<User> {
    user.require_admin()?;
    let Json(input) = payload?;
    let pool = db().await?;

    let created = UsersService::new(pool.clone()).create(input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: created.id,
            entity_name: Some(created.full_name()),
            old_data: None,
            new_data: snapshot(&created),
            metadata: None,
        },
    )
    .await;
    Ok(ApiResponse::created(created))
}

/// PUT /api/users/:id - partial update
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateUserInput>, JsonRejection>,
) -> ApiResult<User> {
    user.require_admin()?;
    let Json(patch) = payload?;
    let pool = db().await?;
    let service = UsersService::new(pool.clone());

    let before = service.get(id).await?;
    let after = service.update(id, patch).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(after.full_name()),
            old_data: snapshot(&before),
            new_data: snapshot(&after),
            metadata: None,
        },
    )
    .await;
    Ok(ApiResponse::success(after))
}

/// DELETE /api/users/:id - admins cannot delete themselves
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    user.require_admin()?;
    let pool = db().await?;

    let deleted = UsersService::new(pool.clone()).delete(id, user.user_id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(deleted.full_name()),
            old_data: snapshot(&deleted),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("User deleted successfully"))
}

/// POST /api/users/:id/unlock - clear a login lockout
pub async fn unlock(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<User> {
    user.require_admin()?;
    let pool = db().await?;
    let service = UsersService::new(pool.clone());

    let before = service.get(id).await?;
    let after = service.unlock(id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(after.full_name()),
            old_data: snapshot(&before),
            new_data: snapshot(&after),
            metadata: Some(json!({ "operation": "unlock" })),
        },
    )
    .await;
    Ok(ApiResponse::success(after))
}

/// POST /api/users/:id/reset-password - set a new password and clear any lockout
pub async fn reset_password(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> ApiResult<Value> {
    user.require_admin()?;
    let Json(request) = payload?;
    let pool = db().await?;

    let updated = UsersService::new(pool.clone())
        .reset_password(id, &request.new_password)
        .await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(updated.full_name()),
            old_data: None,
            new_data: None,
            metadata: Some(json!({ "operation": "reset_password" })),
        },
    )
    .await;
    Ok(message("Password reset successfully"))
}
