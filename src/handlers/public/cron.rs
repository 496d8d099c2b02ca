use axum::http::HeaderMap;
use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::config;
use crate::error::ApiError;
use crate::handlers::db;
use crate::middleware::auth::bearer_token;
use crate::middleware::cors::CRON_SECRET_HEADER;
use crate::middleware::{ApiResponse, ApiResult};
use crate::worker::{self, EscalationSummary, ReminderSummary};

/// Secret from `X-Cron-Secret`, else `Authorization: Bearer`
fn provided_secret(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| bearer_token(headers))
}

/// An unset secret rejects every call
pub fn cron_authorized(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    match provided_secret(headers) {
        Some(provided) => provided.as_bytes().ct_eq(expected.as_bytes()).into(),
        None => false,
    }
}

fn authorize(headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = config::config().security.cron_secret.as_deref();
    if expected.is_none() {
        tracing::warn!("Cron call rejected: CRON_SECRET is not configured");
    }
    if cron_authorized(headers, expected) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("Unauthorized"))
    }
}

/// GET /api/cron/followups - escalate overdue follow-ups
pub async fn followups(headers: HeaderMap) -> ApiResult<EscalationSummary> {
    authorize(&headers)?;
    let pool = db().await?;
    let summary = worker::run_escalations(&pool, &config::config().worker, Utc::now()).await?;
    Ok(ApiResponse::success(summary))
}

/// POST /api/cron/application-followups - remind recruiters of application follow-ups
pub async fn application_followups(headers: HeaderMap) -> ApiResult<ReminderSummary> {
    authorize(&headers)?;
    let pool = db().await?;
    let summary = worker::run_reminders(&pool, &config::config().worker, Utc::now()).await?;
    Ok(ApiResponse::success(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    #[test]
    fn unset_secret_rejects() {
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("anything"));
        assert!(!cron_authorized(&headers, None));
    }

    #[test]
    fn accepts_header_or_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(cron_authorized(&headers, Some("s3cret")));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(cron_authorized(&headers, Some("s3cret")));
    }

    #[test]
    fn wrong_or_missing_secret_rejects() {
        let mut headers = HeaderMap::new();
        assert!(!cron_authorized(&headers, Some("s3cret")));
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("s3cre"));
        assert!(!cron_authorized(&headers, Some("s3cret")));
    }
}
