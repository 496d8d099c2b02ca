use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::database::models::{ActivityType, FollowUp, NotificationChannel, NotificationType, UserRole};
use crate::services::activity_service::{ActivityService, NewActivity};
use crate::services::client_service::ClientService;
use crate::services::error::ServiceResult;
use crate::services::follow_up_service::FollowUpService;
use crate::services::lead_service::LeadService;
use crate::services::notification_service::{NewNotification, NotificationService};
use crate::services::users_service::UsersService;

/// Who an overdue follow-up is escalated to. Discriminants are persisted in
/// `follow_ups.last_escalation_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationLevel {
    Employee = 1,
    Manager = 2,
    Admin = 3,
}

impl EscalationLevel {
    pub fn for_hours(hours_overdue: i64, config: &WorkerConfig) -> Self {
        if hours_overdue >= config.admin_escalation_hours {
            EscalationLevel::Admin
        } else if hours_overdue >= config.manager_escalation_hours {
            EscalationLevel::Manager
        } else {
            EscalationLevel::Employee
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EscalationLevel::Employee => "employee",
            EscalationLevel::Manager => "manager",
            EscalationLevel::Admin => "admin",
        }
    }

    /// Notify only when the level rises above what was last recorded
    pub fn is_new(self, last_recorded: i32) -> bool {
        self.as_i32() > last_recorded
    }
}

/// Whole hours between the schedule and `now`
pub fn hours_overdue(scheduled: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - scheduled).num_milliseconds().div_euclid(1000 * 60 * 60)
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationSummary {
    pub checked: usize,
    pub escalated: usize,
    pub notifications: usize,
    pub failed: usize,
}

struct Notice {
    recipients: Vec<Uuid>,
    title: String,
    message: String,
}

pub struct Escalator {
    pool: PgPool,
    config: WorkerConfig,
}

impl Escalator {
    pub fn new(pool: PgPool, config: WorkerConfig) -> Self {
        Self { pool, config }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> ServiceResult<EscalationSummary> {
        let overdue = FollowUpService::new(self.pool.clone()).overdue(now).await?;
        let mut summary = EscalationSummary {
            checked: overdue.len(),
            ..Default::default()
        };

        for follow_up in &overdue {
            match self.escalate(follow_up, now).await {
                Ok(Some(sent)) => {
                    summary.escalated += 1;
                    summary.notifications += sent;
                }
                Ok(None) => {}
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(follow_up_id = %follow_up.id, "Follow-up escalation failed: {}", e);
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            escalated = summary.escalated,
            notifications = summary.notifications,
            "follow-up escalation run finished"
        );
        Ok(summary)
    }

    /// Returns the number of notifications sent, or `None` when nothing changed
    async fn escalate(&self, follow_up: &FollowUp, now: DateTime<Utc>) -> ServiceResult<Option<usize>> {
        let hours = hours_overdue(follow_up.scheduled_date, now);
        let level = EscalationLevel::for_hours(hours, &self.config);
        if !level.is_new(follow_up.last_escalation_level) {
            return Ok(None);
        }

        let users = UsersService::new(self.pool.clone());
        let assignee = users.get(follow_up.assigned_user_id).await?;
        let owner_name = assignee.full_name();
        let title = &follow_up.title;

        let notice = match level {
            EscalationLevel::Employee => Notice {
                recipients: vec![assignee.id],
                title: "Follow-up Overdue".to_string(),
                message: format!(
                    "Your follow-up \"{}\" was due {} hour(s) ago. Please complete it as soon as possible.",
                    title, hours
                ),
            },
            EscalationLevel::Manager => match assignee.manager_id {
                Some(manager_id) => Notice {
                    recipients: vec![manager_id, assignee.id],
                    title: "Follow-up Escalation - Manager".to_string(),
                    message: format!(
                        "Follow-up \"{}\" assigned to {} is {} hours overdue. Please follow up.",
                        title, owner_name, hours
                    ),
                },
                None => Notice {
                    recipients: users.ids_with_role(UserRole::Admin).await?,
                    title: "Follow-up Escalation - Admin".to_string(),
                    message: format!(
                        "Follow-up \"{}\" assigned to {} is {} hours overdue. No manager assigned.",
                        title, owner_name, hours
                    ),
                },
            },
            EscalationLevel::Admin => Notice {
                recipients: users.ids_with_role(UserRole::Admin).await?,
                title: "Follow-up SLA Breach - Admin Escalation".to_string(),
                message: format!(
                    "CRITICAL: Follow-up \"{}\" assigned to {} is {} hours overdue ({}+ hours). Immediate action required.",
                    title, owner_name, hours, self.config.admin_escalation_hours
                ),
            },
        };

        let template = NewNotification {
            user_id: assignee.id,
            notification_type: NotificationType::OverdueTask,
            channel: NotificationChannel::InApp,
            title: notice.title,
            message: notice.message,
            metadata: Some(serde_json::json!({
                "followUpId": follow_up.id,
                "hoursOverdue": hours,
                "escalationLevel": level.as_str(),
            })),
        };
        let claimed = FollowUpService::new(self.pool.clone())
            .claim_escalation_level(follow_up.id, level.as_i32())
            .await?;
        if !claimed {
            tracing::debug!(follow_up_id = %follow_up.id, level = level.as_str(), "escalation already recorded");
            return Ok(None);
        }

        let sent = NotificationService::new(self.pool.clone())
            .send_to_many(&notice.recipients, &template)
            .await?;

        let entity_name = self.entity_name(follow_up).await;
        ActivityService::new(self.pool.clone())
            .create(NewActivity {
                lead_id: follow_up.lead_id,
                client_id: follow_up.client_id,
                assigned_user_id: assignee.id,
                activity_type: ActivityType::FollowUp,
                title: format!("Follow-up Escalation: {}", level.as_str().to_uppercase()),
                description: Some(format!(
                    "Follow-up \"{}\" for {} is {} hours overdue. Escalated to {}.",
                    title,
                    entity_name,
                    hours,
                    level.as_str()
                )),
                occurred_at: Some(now),
            })
            .await?;

        tracing::info!(
            follow_up_id = %follow_up.id,
            level = level.as_str(),
            hours,
            recipients = sent.len(),
            "follow-up escalated"
        );
        Ok(Some(sent.len()))
    }

    async fn entity_name(&self, follow_up: &FollowUp) -> String {
        if let Some(lead_id) = follow_up.lead_id {
            if let Ok(lead) = LeadService::new(self.pool.clone()).find(lead_id).await {
                return format!("{} (Lead)", lead.company_name);
            }
        }
        if let Some(client_id) = follow_up.client_id {
            if let Ok(client) = ClientService::new(self.pool.clone()).find(client_id).await {
                return format!("{} (Client)", client.company_name);
            }
        }
        "Unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn config() -> WorkerConfig {
        WorkerConfig {
            enabled: true,
            interval_secs: 900,
            manager_escalation_hours: 48,
            admin_escalation_hours: 96,
            reminder_lookahead_days: 1,
        }
    }

    #[test]
    fn levels_follow_hour_thresholds() {
        let cfg = config();
        assert_eq!(EscalationLevel::for_hours(0, &cfg), EscalationLevel::Employee);
        assert_eq!(EscalationLevel::for_hours(47, &cfg), EscalationLevel::Employee);
        assert_eq!(EscalationLevel::for_hours(48, &cfg), EscalationLevel::Manager);
        assert_eq!(EscalationLevel::for_hours(95, &cfg), EscalationLevel::Manager);
        assert_eq!(EscalationLevel::for_hours(96, &cfg), EscalationLevel::Admin);
    }

    #[test]
    fn only_rising_levels_notify() {
        assert!(EscalationLevel::Employee.is_new(0));
        assert!(!EscalationLevel::Employee.is_new(1));
        assert!(EscalationLevel::Manager.is_new(1));
        assert!(!EscalationLevel::Manager.is_new(3));
        assert!(EscalationLevel::Admin.is_new(2));
    }

    #[test]
    fn hours_are_floored() {
        let now = Utc.with_ymd_and_hms(2025, 1, 3, 12, 0, 0).unwrap();
        assert_eq!(hours_overdue(now - Duration::minutes(90), now), 1);
        assert_eq!(hours_overdue(now - Duration::hours(48), now), 48);
        assert_eq!(hours_overdue(now, now), 0);
    }
}
