// handlers/mod.rs - two security tiers
//
// public:    no authentication (login, public onboarding forms, cron with shared secret)
// protected: JWT from the Authorization header or the `token` cookie (/api/*)

pub mod protected;
pub mod public;

use axum::http::HeaderMap;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::RuleEntity;
use crate::database::DatabaseManager;
use crate::error::ApiError;
use crate::services::audit_service::{AuditService, Mutation, MutationAction, RequestContext};
use crate::services::rules::RuleService;

/// Shared pool; an unreachable database maps to 503
pub(crate) async fn db() -> Result<PgPool, ApiError> {
    Ok(DatabaseManager::pool().await?)
}

pub(crate) fn snapshot<T: Serialize>(record: &T) -> Option<Value> {
    serde_json::to_value(record).ok()
}

/// Audit entry for a handler-level mutation
pub(crate) struct AuditEntry<'a> {
    pub user_id: Uuid,
    pub action: MutationAction,
    pub entity: &'a str,
    pub entity_id: Uuid,
    pub entity_name: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub metadata: Option<Value>,
}

pub(crate) async fn audit(pool: &PgPool, headers: &HeaderMap, entry: AuditEntry<'_>) {
    let context = RequestContext::from_headers(headers);
    AuditService::new(pool.clone())
        .log_mutation(
            Mutation {
                user_id: entry.user_id,
                action: entry.action,
                entity: entry.entity,
                entity_id: entry.entity_id.to_string(),
                entity_name: entry.entity_name,
                old_data: entry.old_data,
                new_data: entry.new_data,
                metadata: entry.metadata,
            },
            &context,
        )
        .await;
}

/// Evaluates enabled rules for a freshly written record in the background
pub(crate) fn trigger_rules<T: Serialize>(pool: &PgPool, entity: RuleEntity, id: Uuid, record: &T) {
    let Some(data) = snapshot(record) else {
        return;
    };
    let pool = pool.clone();
    tokio::spawn(async move {
        match RuleService::new(pool).evaluate_for_entity(entity, id, &data, Utc::now()).await {
            Ok(0) => {}
            Ok(fired) => tracing::debug!(entity = entity.as_str(), %id, fired, "rules fired"),
            Err(e) => tracing::error!(entity = entity.as_str(), %id, "Rule evaluation failed: {}", e),
        }
    });
}
