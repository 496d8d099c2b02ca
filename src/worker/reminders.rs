use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::config::WorkerConfig;
use crate::database::models::application::{Application, ReminderState};
use crate::database::models::{Client, Job, NotificationChannel, NotificationType};
use crate::services::application_service::ApplicationService;
use crate::services::client_service::ClientService;
use crate::services::error::ServiceResult;
use crate::services::job_service::JobService;
use crate::services::notification_service::{NewNotification, NotificationService};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSummary {
    pub checked: usize,
    pub reminders_created: usize,
    pub failed: usize,
}

/// The state a reminder for `follow_up` would announce at `now`
pub fn reminder_state(follow_up: DateTime<Utc>, now: DateTime<Utc>) -> ReminderState {
    if follow_up < now {
        ReminderState::Overdue
    } else {
        ReminderState::Upcoming
    }
}

/// One reminder per state; a state already announced is skipped
pub fn needs_reminder(application: &Application, state: ReminderState) -> bool {
    application.reminder_state.as_deref() != Some(state.as_str())
}

fn client_name(client: Option<&Client>) -> String {
    match client {
        Some(c) => match (&c.first_name, &c.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            _ => c.contact_name.clone(),
        },
        None => "Unknown Client".to_string(),
    }
}

fn compose(
    state: ReminderState,
    follow_up: DateTime<Utc>,
    client: Option<&Client>,
    job: Option<&Job>,
) -> (String, String) {
    let name = client_name(client);
    let job_label = job
        .map(|j| format!("{} at {}", j.title, j.company))
        .unwrap_or_else(|| "application".to_string());
    match state {
        ReminderState::Overdue => (
            format!("Overdue Follow-up: {}", name),
            format!("Follow-up for {} ({}) is overdue.", name, job_label),
        ),
        ReminderState::Upcoming => (
            format!("Upcoming Follow-up: {}", name),
            format!(
                "Follow-up for {} ({}) is scheduled for {}.",
                name,
                job_label,
                follow_up.format("%Y-%m-%d")
            ),
        ),
    }
}

pub struct ReminderJob {
    pool: PgPool,
    config: WorkerConfig,
}

impl ReminderJob {
    pub fn new(pool: PgPool, config: WorkerConfig) -> Self {
        Self { pool, config }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> ServiceResult<ReminderSummary> {
        let horizon = now + Duration::days(self.config.reminder_lookahead_days);
        let applications = ApplicationService::new(self.pool.clone())
            .due_for_reminder(horizon)
            .await?;

        let mut summary = ReminderSummary {
            checked: applications.len(),
            ..Default::default()
        };

        for application in &applications {
            match self.remind(application, now).await {
                Ok(true) => summary.reminders_created += 1,
                Ok(false) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(application_id = %application.id, "Application reminder failed: {}", e);
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            created = summary.reminders_created,
            "application follow-up reminders finished"
        );
        Ok(summary)
    }

    async fn remind(&self, application: &Application, now: DateTime<Utc>) -> ServiceResult<bool> {
        let Some(follow_up) = application.follow_up_date else {
            return Ok(false);
        };
        let state = reminder_state(follow_up, now);
        if !needs_reminder(application, state) {
            return Ok(false);
        }

        let client = ClientService::new(self.pool.clone())
            .find(application.client_id)
            .await
            .ok();
        let job = match application.job_id {
            Some(job_id) => JobService::new(self.pool.clone()).find(job_id).await.ok(),
            None => None,
        };
        let (title, message) = compose(state, follow_up, client.as_ref(), job.as_ref());

        let claimed = ApplicationService::new(self.pool.clone())
            .claim_reminder_state(application.id, application.reminder_state.as_deref(), state)
            .await?;
        if !claimed {
            tracing::debug!(application_id = %application.id, "reminder already handled by another run");
            return Ok(false);
        }

        NotificationService::new(self.pool.clone())
            .send(NewNotification {
                user_id: application.recruiter_id,
                notification_type: NotificationType::FollowUpReminder,
                channel: NotificationChannel::Email,
                title,
                message,
                metadata: Some(serde_json::json!({
                    "applicationId": application.id,
                    "reminder": state.as_str(),
                })),
            })
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ApplicationStage;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn application(reminder: Option<&str>) -> Application {
        let now = Utc::now();
        Application {
            id: Uuid::new_v4(),
            job_id: None,
            client_id: Uuid::new_v4(),
            recruiter_id: Uuid::new_v4(),
            stage: ApplicationStage::Applied,
            notes: None,
            follow_up_date: Some(now),
            reminder_state: reminder.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn state_depends_on_follow_up_date() {
        let now = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
        assert_eq!(reminder_state(now - Duration::minutes(1), now), ReminderState::Overdue);
        assert_eq!(reminder_state(now + Duration::hours(3), now), ReminderState::Upcoming);
    }

    #[test]
    fn each_state_is_announced_once() {
        assert!(needs_reminder(&application(None), ReminderState::Upcoming));
        assert!(!needs_reminder(&application(Some("UPCOMING")), ReminderState::Upcoming));
        assert!(needs_reminder(&application(Some("UPCOMING")), ReminderState::Overdue));
        assert!(!needs_reminder(&application(Some("OVERDUE")), ReminderState::Overdue));
    }

    #[test]
    fn messages_name_the_job_when_known() {
        let date = Utc.with_ymd_and_hms(2025, 2, 2, 9, 0, 0).unwrap();
        let (title, message) = compose(ReminderState::Upcoming, date, None, None);
        assert_eq!(title, "Upcoming Follow-up: Unknown Client");
        assert_eq!(
            message,
            "Follow-up for Unknown Client (application) is scheduled for 2025-02-02."
        );
    }
}
