use axum::extract::{Extension, Query};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::AuditLog;
use crate::error::ApiError;
use crate::handlers::db;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::analytics_service::parse_date;
use crate::services::audit_service::{AuditFilter, AuditService};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub user_id: Option<Uuid>,
    pub entity_type: Option<String>,
    pub action: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
}

impl AuditQuery {
    fn into_filter(self) -> Result<AuditFilter, ApiError> {
        let start = self
            .start_date
            .as_deref()
            .map(|raw| parse_date(raw, "startDate"))
            .transpose()?;
        let end = self
            .end_date
            .as_deref()
            .map(|raw| parse_date(raw, "endDate"))
            .transpose()?;
        Ok(AuditFilter {
            user_id: self.user_id,
            entity_type: self.entity_type,
            action: self.action.map(|a| a.to_uppercase()),
            start,
            end,
            limit: self.limit,
        })
    }
}

/// GET /api/audit - ADMIN
pub async fn list(
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Vec<AuditLog>> {
    user.require_admin()?;
    let filter = query.into_filter()?;
    let pool = db().await?;
    Ok(ApiResponse::success(AuditService::new(pool).list(&filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_dates_become_filter_bounds() {
        let filter = AuditQuery {
            action: Some("update".to_string()),
            start_date: Some("2025-01-01".to_string()),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.action.as_deref(), Some("UPDATE"));
        assert!(filter.start.is_some());
        assert!(filter.end.is_none());

        let bad = AuditQuery {
            end_date: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(bad.into_filter().is_err());
    }
}
