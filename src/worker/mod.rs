pub mod escalation;
pub mod reminders;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::WorkerConfig;
use crate::database::DatabaseManager;
use crate::services::audit_service::AuditService;
use crate::services::error::ServiceResult;
use crate::services::rules::{RuleService, SweepResult};

pub use escalation::{EscalationLevel, EscalationSummary, Escalator};
pub use reminders::{ReminderJob, ReminderSummary};

/// Outcome of one worker tick
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerRun {
    pub escalations: EscalationSummary,
    pub reminders: ReminderSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<SweepResult>>,
}

/// Escalations, then application reminders, then optionally a rule sweep.
/// A failing step is recorded in the audit log and does not stop the others.
pub async fn run_once(pool: &PgPool, config: &WorkerConfig, now: DateTime<Utc>, sweep_rules: bool) -> WorkerRun {
    let mut run = WorkerRun::default();

    match Escalator::new(pool.clone(), config.clone()).run(now).await {
        Ok(summary) => run.escalations = summary,
        Err(e) => record_failure(pool, "follow_up_escalation", &e.to_string()).await,
    }

    match ReminderJob::new(pool.clone(), config.clone()).run(now).await {
        Ok(summary) => run.reminders = summary,
        Err(e) => record_failure(pool, "application_reminders", &e.to_string()).await,
    }

    if sweep_rules {
        match RuleService::new(pool.clone()).evaluate_all(now).await {
            Ok(results) => run.rules = Some(results),
            Err(e) => record_failure(pool, "rule_sweep", &e.to_string()).await,
        }
    }

    run
}

/// Only the escalation step, as triggered by `GET /api/cron/followups`
pub async fn run_escalations(pool: &PgPool, config: &WorkerConfig, now: DateTime<Utc>) -> ServiceResult<EscalationSummary> {
    Escalator::new(pool.clone(), config.clone()).run(now).await
}

/// Only the reminder step, as triggered by `POST /api/cron/application-followups`
pub async fn run_reminders(pool: &PgPool, config: &WorkerConfig, now: DateTime<Utc>) -> ServiceResult<ReminderSummary> {
    ReminderJob::new(pool.clone(), config.clone()).run(now).await
}

async fn record_failure(pool: &PgPool, job: &str, error: &str) {
    tracing::error!(job, "Worker step failed: {}", error);
    AuditService::new(pool.clone())
        .log_event(
            None,
            "WORKER_ERROR",
            "worker",
            Some(serde_json::json!({ "job": job, "error": error })),
        )
        .await;
}

/// Runs `run_once` every `interval_secs` until the process exits. Returns
/// `None` when the worker is disabled.
pub fn spawn_scheduler(config: WorkerConfig) -> Option<JoinHandle<()>> {
    if !config.enabled {
        tracing::info!("Background worker disabled");
        return None;
    }

    let period = Duration::from_secs(config.interval_secs.max(1));
    tracing::info!(interval_secs = period.as_secs(), "Starting background worker");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let pool = match DatabaseManager::pool().await {
                Ok(pool) => pool,
                Err(e) => {
                    tracing::warn!("Worker tick skipped, database unavailable: {}", e);
                    continue;
                }
            };
            let run = run_once(&pool, &config, Utc::now(), true).await;
            tracing::debug!(
                escalated = run.escalations.escalated,
                reminders = run.reminders.reminders_created,
                "worker tick complete"
            );
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_worker_does_not_spawn() {
        let config = WorkerConfig {
            enabled: false,
            interval_secs: 60,
            manager_escalation_hours: 48,
            admin_escalation_hours: 96,
            reminder_lookahead_days: 1,
        };
        assert!(spawn_scheduler(config).is_none());
    }

    #[test]
    fn run_summary_omits_rules_when_not_swept() {
        let value = serde_json::to_value(WorkerRun::default()).unwrap();
        assert!(value.get("rules").is_none());
        assert_eq!(value["reminders"]["remindersCreated"], 0);
        assert_eq!(value["escalations"]["escalated"], 0);
    }
}
