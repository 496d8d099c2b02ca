use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::config;
use crate::database::DatabaseManager;
use crate::middleware::RequestStats;
use crate::services::audit_service::AuditService;
use crate::services::error::ServiceResult;
use crate::services::follow_up_service::FollowUpService;
use crate::services::lead_document_service::LeadDocumentService;

pub const ERROR_RATE_CRITICAL: i64 = 10;
pub const STORAGE_CRITICAL_PERCENT: f64 = 90.0;
pub const STORAGE_WARNING_PERCENT: f64 = 80.0;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StorageUsage {
    pub total: i64,
    pub used: i64,
    pub available: i64,
    pub percentage: f64,
}

impl StorageUsage {
    pub fn new(used: i64, total: i64) -> Self {
        let percentage = if total > 0 {
            ((used as f64 / total as f64) * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            total,
            used,
            available: (total - used).max(0),
            percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub database_reachable: bool,
    pub active_users: i64,
    pub api_request_rate: f64,
    pub database_connections: u32,
    pub queue_job_count: i64,
    pub error_rate: i64,
    pub system_uptime: u64,
    pub storage_usage: StorageUsage,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthIssue {
    #[serde(rename = "type")]
    pub issue_type: &'static str,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub metrics: HealthMetrics,
    pub issues: Vec<HealthIssue>,
}

/// Threshold checks over a metrics snapshot
pub fn assess_issues(metrics: &HealthMetrics) -> Vec<HealthIssue> {
    let mut issues = Vec::new();

    if !metrics.database_reachable {
        issues.push(HealthIssue {
            issue_type: "database",
            message: "Database connection failure".to_string(),
            severity: Severity::Critical,
        });
    }

    if metrics.error_rate > ERROR_RATE_CRITICAL {
        issues.push(HealthIssue {
            issue_type: "error_rate",
            message: format!("High error rate: {} errors per hour", metrics.error_rate),
            severity: Severity::Critical,
        });
    }

    let pct = metrics.storage_usage.percentage;
    if pct > STORAGE_CRITICAL_PERCENT {
        issues.push(HealthIssue {
            issue_type: "storage",
            message: format!("Storage capacity critical: {:.1}% used", pct),
            severity: Severity::Critical,
        });
    } else if pct > STORAGE_WARNING_PERCENT {
        issues.push(HealthIssue {
            issue_type: "storage",
            message: format!("Storage capacity warning: {:.1}% used", pct),
            severity: Severity::Warning,
        });
    }

    issues
}

/// Collects metrics; database-backed figures read as zero when the pool is unavailable
pub struct SystemHealthService {
    pool: Option<PgPool>,
}

impl SystemHealthService {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn connect() -> Self {
        match DatabaseManager::pool().await {
            Ok(pool) => Self::new(Some(pool)),
            Err(e) => {
                tracing::error!("System health without database: {}", e);
                Self::new(None)
            }
        }
    }

    async fn active_users(pool: &PgPool, now: DateTime<Utc>) -> ServiceResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE is_active = TRUE AND last_login >= $1",
        )
        .bind(now - Duration::hours(24))
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    async fn database_figures(pool: &PgPool, now: DateTime<Utc>) -> ServiceResult<(i64, i64, i64, i64)> {
        sqlx::query("SELECT 1").execute(pool).await?;
        let active = Self::active_users(pool, now).await?;
        let queued = FollowUpService::new(pool.clone()).count_overdue(now).await?;
        let audit_errors = AuditService::new(pool.clone())
            .count_errors_since(now - Duration::hours(1))
            .await?;
        let used = LeadDocumentService::total_size(pool).await?;
        Ok((active, queued, audit_errors, used))
    }

    pub async fn metrics(&self, now: DateTime<Utc>) -> HealthMetrics {
        let stats = RequestStats::global();

        let figures = match &self.pool {
            Some(pool) => match Self::database_figures(pool, now).await {
                Ok(figures) => Some(figures),
                Err(e) => {
                    tracing::error!("Failed to collect database health figures: {}", e);
                    None
                }
            },
            None => None,
        };
        let database_reachable = figures.is_some();
        let (active_users, queue_job_count, audit_errors, used) = figures.unwrap_or_default();

        HealthMetrics {
            database_reachable,
            active_users,
            api_request_rate: stats.requests_per_minute(),
            database_connections: DatabaseManager::connections_in_use(),
            queue_job_count,
            error_rate: audit_errors + stats.recent_server_errors() as i64,
            system_uptime: stats.uptime_secs(),
            storage_usage: StorageUsage::new(used, config::config().storage.capacity_bytes),
            timestamp: now,
        }
    }

    pub async fn report(&self, now: DateTime<Utc>) -> HealthReport {
        let metrics = self.metrics(now).await;
        let issues = assess_issues(&metrics);
        for issue in &issues {
            tracing::warn!(kind = issue.issue_type, severity = ?issue.severity, "{}", issue.message);
        }
        HealthReport { metrics, issues }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> HealthMetrics {
        HealthMetrics {
            database_reachable: true,
            active_users: 3,
            api_request_rate: 1.5,
            database_connections: 1,
            queue_job_count: 0,
            error_rate: 0,
            system_uptime: 60,
            storage_usage: StorageUsage::new(10, 100),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn storage_percentage_is_rounded() {
        let usage = StorageUsage::new(1, 3);
        assert_eq!(usage.percentage, 33.33);
        assert_eq!(usage.available, 2);
        assert_eq!(StorageUsage::new(5, 0).percentage, 0.0);
        assert_eq!(StorageUsage::new(150, 100).available, 0);
    }

    #[test]
    fn healthy_snapshot_has_no_issues() {
        assert!(assess_issues(&healthy()).is_empty());
    }

    #[test]
    fn thresholds_raise_issues() {
        let mut metrics = healthy();
        metrics.database_reachable = false;
        metrics.error_rate = 11;
        metrics.storage_usage = StorageUsage::new(85, 100);

        let issues = assess_issues(&metrics);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].issue_type, "database");
        assert_eq!(issues[1].severity, Severity::Critical);
        assert_eq!(issues[2].severity, Severity::Warning);
        assert_eq!(issues[2].message, "Storage capacity warning: 85.0% used");

        metrics.storage_usage = StorageUsage::new(95, 100);
        metrics.error_rate = 10;
        let issues = assess_issues(&metrics);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].severity, Severity::Critical);
    }
}
