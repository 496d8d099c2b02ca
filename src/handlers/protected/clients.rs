use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::{Client, ClientStatus, RuleEntity};
use crate::handlers::{audit, db, snapshot, trigger_rules, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::audit_service::MutationAction;
use crate::services::client_service::{ClientService, NewClient, UpdateClientInput};

#[derive(Debug, Deserialize)]
pub struct ClientListQuery {
    pub status: Option<ClientStatus>,
}

/// GET /api/clients?status=
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ClientListQuery>,
) -> ApiResult<Vec<Client>> {
    let pool = db().await?;
    Ok(ApiResponse::success(ClientService::new(pool).list(&user, query.status).await?))
}

/// POST /api/clients
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<NewClient>, JsonRejection>,
) -> ApiResult<Client> {
    let Json(input) = payload?;
    let pool = db().await?;

    let client = ClientService::new(pool.clone()).create(&user, input).await?;
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
            metadata: None,
        },
    )
    .await;
    trigger_rules(&pool, RuleEntity::Client, client.id, &client);
    Ok(ApiResponse::created(client))
}

/// GET /api/clients/:id
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<Client> {
    let pool = db().await?;
    Ok(ApiResponse::success(ClientService::new(pool).get(&user, id).await?))
}

/// PUT /api/clients/:id
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateClientInput>, JsonRejection>,
) -> ApiResult<Client> {
    let Json(patch) = payload?;
    let pool = db().await?;

    let (before, after) = ClientService::new(pool.clone()).update(&user, id, patch).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: "Client",
            entity_id: id,
            entity_name: Some(after.contact_name.clone()),
            old_data: snapshot(&before),
            new_data: snapshot(&after),
            metadata: None,
        },
    )
    .await;
    trigger_rules(&pool, RuleEntity::Client, id, &after);
    Ok(ApiResponse::success(after))
}

/// DELETE /api/clients/:id
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = db().await?;

    let client = ClientService::new(pool.clone()).delete(&user, id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: "Client",
            entity_id: id,
            entity_name: Some(client.contact_name.clone()),
            old_data: snapshot(&client),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("Client deleted successfully"))
}
