use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::models::{ApplicationStage, JobSource, UserRole};
use crate::services::error::{ServiceError, ServiceResult};

pub const DEFAULT_PERIOD_DAYS: i64 = 30;

/// Raw period parameters from the query string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub recruiter_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    /// Missing bounds default to the last 30 days ending `now`
    pub fn resolve(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> ServiceResult<Self> {
        let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_date(raw, "endDate")?,
            None => now,
        };
        let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => parse_date(raw, "startDate")?,
            None => now - Duration::days(DEFAULT_PERIOD_DAYS),
        };
        if start > end {
            return Err(ServiceError::field("startDate", "Start date must be before end date"));
        }
        Ok(Self { start, end })
    }
}

/// RFC 3339 or `YYYY-MM-DD` (midnight UTC)
pub fn parse_date(raw: &str, field: &str) -> ServiceResult<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| ServiceError::field(field, format!("Invalid date: {}", raw)))
}

/// Percentage of `numerator` over `denominator`, zero when nothing to divide by
pub fn conversion_rate(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64 * 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRates {
    pub identified_to_applied: f64,
    pub applied_to_interview: f64,
    pub interview_to_offer: f64,
}

impl ConversionRates {
    pub fn from_stage_counts(counts: &HashMap<ApplicationStage, i64>) -> Self {
        let count = |stage| counts.get(&stage).copied().unwrap_or(0);
        let identified = count(ApplicationStage::Identified);
        let applied = count(ApplicationStage::Applied);
        let interview = count(ApplicationStage::InterviewScheduled);
        let offer = count(ApplicationStage::Offer);
        Self {
            identified_to_applied: conversion_rate(applied, identified),
            applied_to_interview: conversion_rate(interview, applied),
            interview_to_offer: conversion_rate(offer, interview),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruiterMetrics {
    pub recruiter_id: Uuid,
    pub period: Period,
    pub jobs_scraped: i64,
    pub candidates_managed: i64,
    pub applications_created: i64,
    pub conversion_rates: ConversionRates,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecruiterComparison {
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub metrics: RecruiterMetrics,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceCount {
    pub source: JobSource,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageCount {
    pub stage: ApplicationStage,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub period: Period,
    pub platform_usage: Vec<SourceCount>,
    pub funnel_performance: Vec<StageCount>,
}

/// Every pipeline stage in order, zero-filled
pub fn funnel_from_counts(counts: &HashMap<ApplicationStage, i64>) -> Vec<StageCount> {
    ApplicationStage::PIPELINE
        .iter()
        .map(|stage| StageCount {
            stage: *stage,
            count: counts.get(stage).copied().unwrap_or(0),
        })
        .collect()
}

pub struct AnalyticsService {
    pool: PgPool,
}

impl AnalyticsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn stage_counts(&self, recruiter: Option<Uuid>, period: &Period) -> ServiceResult<HashMap<ApplicationStage, i64>> {
        let rows: Vec<(ApplicationStage, i64)> = sqlx::query_as(
            "SELECT stage, COUNT(*) FROM applications \
             WHERE created_at >= $1 AND created_at <= $2 AND ($3::uuid IS NULL OR recruiter_id = $3) \
             GROUP BY stage",
        )
        .bind(period.start)
        .bind(period.end)
        .bind(recruiter)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn recruiter_metrics(&self, recruiter_id: Uuid, period: Period) -> ServiceResult<RecruiterMetrics> {
        let (jobs,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM jobs WHERE recruiter_id = $1 AND created_at >= $2 AND created_at <= $3",
        )
        .bind(recruiter_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_one(&self.pool)
        .await?;

        let (clients,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM clients WHERE assigned_user_id = $1 AND created_at >= $2 AND created_at <= $3",
        )
        .bind(recruiter_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_one(&self.pool)
        .await?;

        let stages = self.stage_counts(Some(recruiter_id), &period).await?;

        Ok(RecruiterMetrics {
            recruiter_id,
            period,
            jobs_scraped: jobs,
            candidates_managed: clients,
            applications_created: stages.values().sum(),
            conversion_rates: ConversionRates::from_stage_counts(&stages),
        })
    }

    /// Jobs per source, busiest first
    pub async fn platform_usage(&self, period: Period) -> ServiceResult<Vec<SourceCount>> {
        let rows: Vec<(JobSource, i64)> = sqlx::query_as(
            "SELECT source, COUNT(*) AS count FROM jobs WHERE created_at >= $1 AND created_at <= $2 \
             GROUP BY source ORDER BY count DESC",
        )
        .bind(period.start)
        .bind(period.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(source, count)| SourceCount { source, count })
            .collect())
    }

    pub async fn funnel_performance(&self, period: Period) -> ServiceResult<Vec<StageCount>> {
        let counts = self.stage_counts(None, &period).await?;
        Ok(funnel_from_counts(&counts))
    }

    pub async fn system_metrics(&self, period: Period) -> ServiceResult<SystemMetrics> {
        Ok(SystemMetrics {
            period,
            platform_usage: self.platform_usage(period).await?,
            funnel_performance: self.funnel_performance(period).await?,
        })
    }

    /// Metrics for every active recruiter, most applications first
    pub async fn recruiter_comparison(&self, period: Period) -> ServiceResult<Vec<RecruiterComparison>> {
        let recruiters: Vec<(Uuid, String, String, String)> = sqlx::query_as(
            "SELECT id, first_name, last_name, email FROM users WHERE role = $1 AND is_active = TRUE",
        )
        .bind(UserRole::Recruiter)
        .fetch_all(&self.pool)
        .await?;

        let mut comparison = Vec::with_capacity(recruiters.len());
        for (id, first_name, last_name, email) in recruiters {
            let metrics = self.recruiter_metrics(id, period).await?;
            comparison.push(RecruiterComparison {
                name: format!("{} {}", first_name, last_name),
                email,
                metrics,
            });
        }
        comparison.sort_by(|a, b| b.metrics.applications_created.cmp(&a.metrics.applications_created));
        Ok(comparison)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 31, 9, 30, 0).unwrap()
    }

    #[test]
    fn period_defaults_to_last_thirty_days() {
        let period = Period::resolve(None, None, now()).unwrap();
        assert_eq!(period.end, now());
        assert_eq!(period.end - period.start, Duration::days(30));
    }

    #[test]
    fn period_accepts_dates_and_timestamps() {
        let period = Period::resolve(Some("2025-05-01"), Some("2025-05-15T12:00:00Z"), now()).unwrap();
        assert_eq!(period.start, Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
        assert_eq!(period.end, Utc.with_ymd_and_hms(2025, 5, 15, 12, 0, 0).unwrap());

        assert!(Period::resolve(Some("yesterday"), None, now()).is_err());
        assert!(Period::resolve(Some("2025-06-01"), Some("2025-05-01"), now()).is_err());
    }

    #[test]
    fn conversion_rates_handle_empty_stages() {
        let mut counts = HashMap::new();
        counts.insert(ApplicationStage::Identified, 4);
        counts.insert(ApplicationStage::Applied, 2);

        let rates = ConversionRates::from_stage_counts(&counts);
        assert_eq!(rates.identified_to_applied, 50.0);
        assert_eq!(rates.applied_to_interview, 0.0);
        assert_eq!(rates.interview_to_offer, 0.0);
    }

    #[test]
    fn funnel_lists_every_stage_in_order() {
        let mut counts = HashMap::new();
        counts.insert(ApplicationStage::Offer, 3);

        let funnel = funnel_from_counts(&counts);
        assert_eq!(funnel.len(), ApplicationStage::PIPELINE.len());
        assert_eq!(funnel[0].stage, ApplicationStage::Identified);
        assert_eq!(funnel[0].count, 0);
        assert_eq!(
            funnel.iter().find(|s| s.stage == ApplicationStage::Offer).map(|s| s.count),
            Some(3)
        );
    }
}
