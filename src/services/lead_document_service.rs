use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::lead::{LeadDocument, LEAD_DOCUMENT_COLUMNS};
use crate::middleware::AuthUser;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::lead_service::LeadService;
use crate::storage::{generate_object_name, ObjectStore};

pub const DOCUMENTS_BUCKET: &str = "documents";
const DEFAULT_NAME: &str = "document";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

pub struct UploadDocument<'a> {
    pub bytes: &'a [u8],
    pub original_name: Option<String>,
    pub content_type: Option<String>,
}

/// Drops the stored object again when recording it failed, so a failed
/// upload leaves no file behind.
async fn discard_on_error<T>(
    store: &dyn ObjectStore,
    key: &str,
    recorded: ServiceResult<T>,
) -> ServiceResult<T> {
    if recorded.is_err() {
        if let Err(e) = store.delete(DOCUMENTS_BUCKET, key).await {
            tracing::warn!(key, "could not remove orphaned document: {}", e);
        }
    }
    recorded
}

pub struct LeadDocumentService {
    pool: PgPool,
    store: Arc<dyn ObjectStore>,
}

impl LeadDocumentService {
    pub fn new(pool: PgPool, store: Arc<dyn ObjectStore>) -> Self {
        Self { pool, store }
    }

    async fn lead_for(&self, caller: &AuthUser, lead_id: Uuid) -> ServiceResult<()> {
        LeadService::new(self.pool.clone()).get(caller, lead_id).await?;
        Ok(())
    }

    pub async fn upload(
        &self,
        caller: &AuthUser,
        lead_id: Uuid,
        upload: UploadDocument<'_>,
    ) -> ServiceResult<LeadDocument> {
        self.lead_for(caller, lead_id).await?;

        if upload.bytes.is_empty() {
            return Err(ServiceError::field("file", "File is empty"));
        }

        let original_name = upload
            .original_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_NAME.to_string());
        let content_type = upload
            .content_type
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let key = generate_object_name(&original_name, Utc::now().timestamp_millis());
        let stored = self
            .store
            .put(DOCUMENTS_BUCKET, &key, upload.bytes, &content_type)
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        let recorded = sqlx::query_as::<_, LeadDocument>(&format!(
            "INSERT INTO lead_documents (lead_id, original_name, stored_name, content_type, size_bytes, \
             checksum, url, uploaded_by) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            LEAD_DOCUMENT_COLUMNS
        ))
        .bind(lead_id)
        .bind(&original_name)
        .bind(&stored.key)
        .bind(&content_type)
        .bind(stored.size as i64)
        .bind(&stored.checksum)
        .bind(&stored.url)
        .bind(caller.user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(ServiceError::from);
        let document = discard_on_error(self.store.as_ref(), &stored.key, recorded).await?;

        tracing::info!(lead_id = %lead_id, document_id = %document.id, size = stored.size, "lead document uploaded");
        Ok(document)
    }

    /// Newest first
    pub async fn list(&self, caller: &AuthUser, lead_id: Uuid) -> ServiceResult<Vec<LeadDocument>> {
        self.lead_for(caller, lead_id).await?;
        let rows = sqlx::query_as::<_, LeadDocument>(&format!(
            "SELECT {} FROM lead_documents WHERE lead_id = $1 ORDER BY created_at DESC",
            LEAD_DOCUMENT_COLUMNS
        ))
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The row is removed even when the stored object cannot be.
    pub async fn delete(&self, caller: &AuthUser, lead_id: Uuid, document_id: Uuid) -> ServiceResult<LeadDocument> {
        self.lead_for(caller, lead_id).await?;

        let document = sqlx::query_as::<_, LeadDocument>(&format!(
            "SELECT {} FROM lead_documents WHERE id = $1 AND lead_id = $2",
            LEAD_DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Document"))?;

        if let Err(e) = self.store.delete(DOCUMENTS_BUCKET, &document.stored_name).await {
            tracing::error!(document_id = %document.id, "Failed to delete file from storage: {}", e);
        }

        sqlx::query("DELETE FROM lead_documents WHERE id = $1")
            .bind(document.id)
            .execute(&self.pool)
            .await?;

        Ok(document)
    }

    /// Total stored bytes across all documents
    pub async fn total_size(pool: &PgPool) -> ServiceResult<i64> {
        let (total,): (Option<i64>,) =
            sqlx::query_as("SELECT SUM(size_bytes)::BIGINT FROM lead_documents")
                .fetch_one(pool)
                .await?;
        Ok(total.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalDiskStore;

    #[tokio::test]
    async fn failed_insert_removes_the_stored_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path(), "http://localhost/files");
        let stored = store
            .put(DOCUMENTS_BUCKET, "1700-abc.pdf", b"%PDF", "application/pdf")
            .await
            .unwrap();
        let path = dir.path().join(DOCUMENTS_BUCKET).join(&stored.key);
        assert!(path.exists());

        let failed: ServiceResult<()> = Err(ServiceError::Conflict("duplicate".to_string()));
        assert!(discard_on_error(&store, &stored.key, failed).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn successful_insert_keeps_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDiskStore::new(dir.path(), "http://localhost/files");
        let stored = store
            .put(DOCUMENTS_BUCKET, "1700-def.pdf", b"%PDF", "application/pdf")
            .await
            .unwrap();

        assert_eq!(discard_on_error(&store, &stored.key, Ok(7)).await.unwrap(), 7);
        assert!(dir.path().join(DOCUMENTS_BUCKET).join(&stored.key).exists());
    }
}
