use axum::{
    extract::{rejection::JsonRejection, Extension, Multipart, Path, Query},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::{Lead, LeadDocument, LeadStatus, RuleEntity};
use crate::error::ApiError;
use crate::handlers::{audit, db, snapshot, trigger_rules, AuditEntry};
use crate::middleware::response::message;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::audit_service::MutationAction;
use crate::services::lead_document_service::{LeadDocumentService, UploadDocument};
use crate::services::lead_service::{CreateLeadInput, LeadService, UpdateLeadInput};
use crate::storage::ObjectStore;

const ENTITY: &str = "Lead";
const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct LeadListQuery {
    pub status: Option<LeadStatus>,
}

/// GET /api/leads?status=
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<LeadListQuery>,
) -> ApiResult<Vec<Lead>> {
    let pool = db().await?;
    Ok(ApiResponse::success(LeadService::new(pool).list(&user, query.status).await?))
}

/// POST /api/leads
pub async fn create(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    payload: Result<Json<CreateLeadInput>, JsonRejection>,
) -> ApiResult<Lead> {
    let Json(input) = payload?;
    let pool = db().await?;

    let lead = LeadService::new(pool.clone()).create(&user, input).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: ENTITY,
            entity_id: lead.id,
            entity_name: Some(lead.company_name.clone()),
            old_data: None,
            new_data: snapshot(&lead),
            metadata: None,
        },
    )
    .await;
    trigger_rules(&pool, RuleEntity::Lead, lead.id, &lead);
    Ok(ApiResponse::created(lead))
}

/// GET /api/leads/:id
pub async fn get(Extension(user): Extension<AuthUser>, Path(id): Path<Uuid>) -> ApiResult<Lead> {
    let pool = db().await?;
    Ok(ApiResponse::success(LeadService::new(pool).get(&user, id).await?))
}

/// PUT /api/leads/:id - partial update; QUALIFIED stamps convertedAt once
pub async fn update(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateLeadInput>, JsonRejection>,
) -> ApiResult<Lead> {
    let Json(patch) = payload?;
    let pool = db().await?;

    let (before, after) = LeadService::new(pool.clone()).update(&user, id, patch).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Update,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(after.company_name.clone()),
            old_data: snapshot(&before),
            new_data: snapshot(&after),
            metadata: None,
        },
    )
    .await;
    trigger_rules(&pool, RuleEntity::Lead, id, &after);
    Ok(ApiResponse::success(after))
}

/// DELETE /api/leads/:id
pub async fn delete(
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    let pool = db().await?;

    let lead = LeadService::new(pool.clone()).delete(&user, id).await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: ENTITY,
            entity_id: id,
            entity_name: Some(lead.company_name.clone()),
            old_data: snapshot(&lead),
            new_data: None,
            metadata: None,
        },
    )
    .await;
    Ok(message("Lead deleted successfully"))
}

/// GET /api/leads/:id/documents
pub async fn list_documents(
    Extension(user): Extension<AuthUser>,
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<LeadDocument>> {
    let pool = db().await?;
    let documents = LeadDocumentService::new(pool, store).list(&user, id).await?;
    Ok(ApiResponse::success(documents))
}

/// POST /api/leads/:id/documents - multipart upload, field `file`
pub async fn upload_document(
    Extension(user): Extension<AuthUser>,
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<LeadDocument> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read file: {}", e)))?;
        file = Some((bytes, original_name, content_type));
        break;
    }
    let (bytes, original_name, content_type) =
        file.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let pool = db().await?;
    let document = LeadDocumentService::new(pool.clone(), store)
        .upload(
            &user,
            id,
            UploadDocument {
                bytes: &bytes,
                original_name,
                content_type,
            },
        )
        .await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Create,
            entity: "LeadDocument",
            entity_id: document.id,
            entity_name: Some(document.original_name.clone()),
            old_data: None,
            new_data: snapshot(&document),
            metadata: Some(json!({ "leadId": id })),
        },
    )
    .await;
    Ok(ApiResponse::created(document))
}

/// DELETE /api/leads/:id/documents/:doc_id
pub async fn delete_document(
    Extension(user): Extension<AuthUser>,
    Extension(store): Extension<Arc<dyn ObjectStore>>,
    headers: HeaderMap,
    Path((id, doc_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Value> {
    let pool = db().await?;
    let document = LeadDocumentService::new(pool.clone(), store)
        .delete(&user, id, doc_id)
        .await?;
    audit(
        &pool,
        &headers,
        AuditEntry {
            user_id: user.user_id,
            action: MutationAction::Delete,
            entity: "LeadDocument",
            entity_id: doc_id,
            entity_name: Some(document.original_name.clone()),
            old_data: snapshot(&document),
            new_data: None,
            metadata: Some(json!({ "leadId": id })),
        },
    )
    .await;
    Ok(message("Document deleted successfully"))
}
