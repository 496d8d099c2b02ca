use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::models::audit::{AuditLog, AUDIT_COLUMNS};
use crate::services::error::ServiceResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl MutationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationAction::Create => "CREATE",
            MutationAction::Update => "UPDATE",
            MutationAction::Delete => "DELETE",
        }
    }
}

/// Caller details recorded alongside a mutation
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .filter(|v| !v.is_empty())
            .or_else(|| header("x-real-ip"));

        Self {
            ip_address,
            user_agent: header("user-agent"),
        }
    }
}

pub struct Mutation<'a> {
    pub user_id: Uuid,
    pub action: MutationAction,
    pub entity: &'a str,
    pub entity_id: String,
    pub entity_name: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Default)]
pub struct AuditFilter {
    pub user_id: Option<Uuid>,
    pub entity_type: Option<String>,
    pub action: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    const DEFAULT_LIMIT: i64 = 100;
    const MAX_LIMIT: i64 = 500;

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a mutation. Failures are logged and swallowed so the caller's
    /// request still succeeds.
    pub async fn log_mutation(&self, mutation: Mutation<'_>, context: &RequestContext) {
        let changes = match (mutation.action, &mutation.old_data, &mutation.new_data) {
            (MutationAction::Update, Some(old), Some(new)) => Some(extract_changes(old, new)),
            _ => None,
        };

        let result = sqlx::query(
            "INSERT INTO audit_logs (user_id, action, entity_type, entity_id, entity_name, \
             changes, metadata, ip_address, user_agent) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(mutation.user_id)
        .bind(mutation.action.as_str())
        .bind(mutation.entity)
        .bind(&mutation.entity_id)
        .bind(&mutation.entity_name)
        .bind(changes)
        .bind(&mutation.metadata)
        .bind(&context.ip_address)
        .bind(&context.user_agent)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(
                entity = mutation.entity,
                entity_id = %mutation.entity_id,
                "Failed to write audit log: {}",
                e
            );
        }
    }

    /// Free-form audit entry (e.g. worker or system errors)
    pub async fn log_event(&self, user_id: Option<Uuid>, action: &str, entity: &str, metadata: Option<Value>) {
        let result = sqlx::query(
            "INSERT INTO audit_logs (user_id, action, entity_type, metadata) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(action)
        .bind(entity)
        .bind(metadata)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::error!(action, entity, "Failed to write audit log: {}", e);
        }
    }

    pub async fn list(&self, filter: &AuditFilter) -> ServiceResult<Vec<AuditLog>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM audit_logs WHERE 1=1", AUDIT_COLUMNS));

        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(entity) = &filter.entity_type {
            query.push(" AND entity_type = ").push_bind(entity.clone());
        }
        if let Some(action) = &filter.action {
            query.push(" AND action = ").push_bind(action.clone());
        }
        if let Some(start) = filter.start {
            query.push(" AND created_at >= ").push_bind(start);
        }
        if let Some(end) = filter.end {
            query.push(" AND created_at <= ").push_bind(end);
        }

        let limit = filter
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        query.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let logs = query.build_query_as::<AuditLog>().fetch_all(&self.pool).await?;
        Ok(logs)
    }

    /// Audit entries whose action mentions ERROR since `since`
    pub async fn count_errors_since(&self, since: DateTime<Utc>) -> ServiceResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM audit_logs WHERE action LIKE '%ERROR%' AND created_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

const INTERNAL_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// Per-key `{old, new}` diff of two JSON objects, ignoring bookkeeping fields
pub fn extract_changes(old: &Value, new: &Value) -> Value {
    let empty = Map::new();
    let old = old.as_object().unwrap_or(&empty);
    let new = new.as_object().unwrap_or(&empty);

    let mut changes = Map::new();
    let keys = old.keys().chain(new.keys().filter(|k| !old.contains_key(*k)));

    for key in keys {
        if INTERNAL_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let before = old.get(key).unwrap_or(&Value::Null);
        let after = new.get(key).unwrap_or(&Value::Null);
        if before == after {
            continue;
        }
        let mut change = Map::new();
        change.insert("old".to_string(), before.clone());
        change.insert("new".to_string(), after.clone());
        changes.insert(key.clone(), Value::Object(change));
    }

    Value::Object(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn changes_skip_identical_and_internal_fields() {
        let old = json!({"id": "1", "title": "Dev", "location": "Remote", "updatedAt": "a"});
        let new = json!({"id": "1", "title": "Senior Dev", "location": "Remote", "updatedAt": "b", "notes": "x"});
        let changes = extract_changes(&old, &new);

        assert_eq!(changes["title"]["old"], "Dev");
        assert_eq!(changes["title"]["new"], "Senior Dev");
        assert_eq!(changes["notes"]["old"], Value::Null);
        assert!(changes.get("location").is_none());
        assert!(changes.get("updatedAt").is_none());
        assert!(changes.get("id").is_none());
    }

    #[test]
    fn request_context_prefers_first_forwarded_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8"));
        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8"));
    }

    #[test]
    fn request_context_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        let ctx = RequestContext::from_headers(&headers);
        assert_eq!(ctx.ip_address.as_deref(), Some("10.0.0.2"));
        assert!(ctx.user_agent.is_none());
    }
}
