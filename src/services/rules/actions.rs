use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{
    ActionType, ActivityType, ApplicationStage, ClientStatus, LeadStatus, NotificationChannel,
    NotificationType, RuleAction, RuleEntity, UserRole,
};
use crate::services::activity_service::{ActivityService, NewActivity};
use crate::services::follow_up_service::{CreateFollowUpInput, FollowUpService};
use crate::services::notification_service::{NewNotification, NotificationService};
use crate::services::users_service::UsersService;
use crate::services::error::{ServiceError, ServiceResult};

/// The entity a rule fired on
#[derive(Debug, Clone, Copy)]
pub struct RuleTarget<'a> {
    pub entity: RuleEntity,
    pub id: Uuid,
    pub data: &'a Value,
}

impl RuleTarget<'_> {
    fn label(&self) -> String {
        self.entity.as_str().to_lowercase().replace('_', " ")
    }

    /// The user responsible for the entity
    pub fn owner(&self) -> Option<Uuid> {
        ["assignedUserId", "recruiterId", "assignedUser.id"]
            .iter()
            .find_map(|path| super::conditions::lookup(self.data, path))
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    fn lead_id(&self) -> Option<Uuid> {
        (self.entity == RuleEntity::Lead).then_some(self.id)
    }

    fn client_id(&self) -> Option<Uuid> {
        (self.entity == RuleEntity::Client).then_some(self.id)
    }
}

fn meta<'a>(action: &'a RuleAction, key: &str) -> Option<&'a Value> {
    action.metadata.as_ref().and_then(|m: &Map<String, Value>| m.get(key))
}

fn meta_uuid(action: &RuleAction, key: &str) -> Option<Uuid> {
    meta(action, key)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn meta_enum<T: DeserializeOwned>(action: &RuleAction, key: &str) -> ServiceResult<Option<T>> {
    match meta(action, key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|_| ServiceError::validation(format!("Invalid {} value: {}", key, value))),
    }
}

/// Parses `metadata.dueDate` as RFC 3339 or a plain date
pub fn due_date(action: &RuleAction) -> Option<DateTime<Utc>> {
    let raw = meta(action, "dueDate")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
                .map(|d| d.and_utc())
        })
}

fn message_or(action: &RuleAction, fallback: String) -> String {
    action
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or(fallback)
}

pub struct ActionExecutor {
    pool: PgPool,
}

impl ActionExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs every action concurrently; the first failure fails the rule
    pub async fn execute_all(&self, actions: &[RuleAction], target: RuleTarget<'_>) -> ServiceResult<()> {
        futures::future::try_join_all(actions.iter().map(|action| self.execute(action, target))).await?;
        Ok(())
    }

    pub async fn execute(&self, action: &RuleAction, target: RuleTarget<'_>) -> ServiceResult<()> {
        match action.action_type {
            ActionType::NotifyEmployee => self.notify_employee(action, target).await,
            ActionType::NotifyManager => self.notify_role(action, target, UserRole::Manager).await,
            ActionType::NotifyAdmin => self.notify_role(action, target, UserRole::Admin).await,
            ActionType::Escalate => {
                futures::try_join!(
                    self.notify_role(action, target, UserRole::Manager),
                    self.notify_role(action, target, UserRole::Admin),
                )?;
                Ok(())
            }
            ActionType::CreateActivity => self.create_activity(action, target).await,
            ActionType::UpdateStatus => self.update_status(action, target).await,
            ActionType::CreateFollowUp => self.create_follow_up(action, target).await,
        }
    }

    async fn notify_employee(&self, action: &RuleAction, target: RuleTarget<'_>) -> ServiceResult<()> {
        let recipient = action
            .target
            .as_deref()
            .and_then(|t| Uuid::parse_str(t.trim()).ok())
            .or_else(|| target.owner());
        let Some(user_id) = recipient else {
            tracing::debug!(entity = target.entity.as_str(), id = %target.id, "no employee to notify");
            return Ok(());
        };

        NotificationService::new(self.pool.clone())
            .send(NewNotification {
                user_id,
                notification_type: NotificationType::FollowUpReminder,
                channel: NotificationChannel::InApp,
                title: "Automation Alert".to_string(),
                message: message_or(action, format!("Action required for {}", target.label())),
                metadata: Some(serde_json::json!({
                    "entity": target.entity.as_str(),
                    "entityId": target.id,
                })),
            })
            .await?;
        Ok(())
    }

    async fn notify_role(&self, action: &RuleAction, target: RuleTarget<'_>, role: UserRole) -> ServiceResult<()> {
        let (title, fallback) = match role {
            UserRole::Admin => ("Critical Alert", format!("{} requires immediate attention", target.entity.as_str())),
            _ => ("Escalation Alert", format!("{} requires attention", target.entity.as_str())),
        };

        let recipients = UsersService::new(self.pool.clone()).ids_with_role(role).await?;
        let template = NewNotification {
            user_id: Uuid::nil(),
            notification_type: NotificationType::OverdueTask,
            channel: NotificationChannel::InApp,
            title: title.to_string(),
            message: message_or(action, fallback),
            metadata: Some(serde_json::json!({
                "entity": target.entity.as_str(),
                "entityId": target.id,
            })),
        };
        NotificationService::new(self.pool.clone())
            .send_to_many(&recipients, &template)
            .await?;
        Ok(())
    }

    async fn create_activity(&self, action: &RuleAction, target: RuleTarget<'_>) -> ServiceResult<()> {
        let Some(assigned_user_id) = meta_uuid(action, "assignedUserId").or_else(|| target.owner()) else {
            return Ok(());
        };

        ActivityService::new(self.pool.clone())
            .create(NewActivity {
                lead_id: target.lead_id(),
                client_id: target.client_id(),
                assigned_user_id,
                activity_type: ActivityType::Note,
                title: "Automation Activity".to_string(),
                description: Some(message_or(action, format!("Automated activity for {}", target.label()))),
                occurred_at: None,
            })
            .await?;
        Ok(())
    }

    async fn update_status(&self, action: &RuleAction, target: RuleTarget<'_>) -> ServiceResult<()> {
        let result = match target.entity {
            RuleEntity::Lead => match meta_enum::<LeadStatus>(action, "status")? {
                Some(status) => Some(
                    sqlx::query(
                        "UPDATE leads SET status = $2, updated_at = NOW(), \
                         converted_at = CASE WHEN $2 = 'QUALIFIED'::lead_status THEN COALESCE(converted_at, NOW()) ELSE converted_at END \
                         WHERE id = $1",
                    )
                    .bind(target.id)
                    .bind(status)
                    .execute(&self.pool)
                    .await?,
                ),
                None => None,
            },
            RuleEntity::Client => match meta_enum::<ClientStatus>(action, "status")? {
                Some(status) => Some(
                    sqlx::query("UPDATE clients SET status = $2, updated_at = NOW() WHERE id = $1")
                        .bind(target.id)
                        .bind(status)
                        .execute(&self.pool)
                        .await?,
                ),
                None => None,
            },
            RuleEntity::Application => match meta_enum::<ApplicationStage>(action, "status")? {
                Some(stage) => Some(
                    sqlx::query("UPDATE applications SET stage = $2, updated_at = NOW() WHERE id = $1")
                        .bind(target.id)
                        .bind(stage)
                        .execute(&self.pool)
                        .await?,
                ),
                None => None,
            },
            _ => None,
        };

        if let Some(done) = result {
            tracing::info!(
                entity = target.entity.as_str(),
                id = %target.id,
                rows = done.rows_affected(),
                "rule updated entity status"
            );
        }
        Ok(())
    }

    async fn create_follow_up(&self, action: &RuleAction, target: RuleTarget<'_>) -> ServiceResult<()> {
        let assigned = meta_uuid(action, "assignedUserId").or_else(|| target.owner());
        let (Some(assigned_user_id), Some(scheduled_date)) = (assigned, due_date(action)) else {
            return Ok(());
        };

        let notes = meta(action, "notes")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Automated follow-up")
            .to_string();

        FollowUpService::new(self.pool.clone())
            .insert(
                assigned_user_id,
                CreateFollowUpInput {
                    lead_id: target.lead_id(),
                    client_id: target.client_id(),
                    assigned_user_id: Some(assigned_user_id),
                    title: "Automated Follow-up".to_string(),
                    description: None,
                    scheduled_date,
                    notes: Some(notes),
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(metadata: Value) -> RuleAction {
        RuleAction {
            action_type: ActionType::CreateFollowUp,
            target: None,
            message: Some("  ".to_string()),
            metadata: metadata.as_object().cloned(),
        }
    }

    #[test]
    fn owner_prefers_assigned_user_then_recruiter() {
        let assigned = Uuid::new_v4();
        let recruiter = Uuid::new_v4();

        let data = json!({"assignedUserId": assigned.to_string(), "recruiterId": recruiter.to_string()});
        let target = RuleTarget { entity: RuleEntity::Lead, id: Uuid::new_v4(), data: &data };
        assert_eq!(target.owner(), Some(assigned));

        let data = json!({"recruiterId": recruiter.to_string()});
        let target = RuleTarget { entity: RuleEntity::Application, id: Uuid::new_v4(), data: &data };
        assert_eq!(target.owner(), Some(recruiter));
        assert_eq!(target.lead_id(), None);
        assert_eq!(target.label(), "application");
    }

    #[test]
    fn due_date_accepts_plain_dates() {
        let parsed = due_date(&action(json!({"dueDate": "2025-06-01"}))).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-06-01T00:00:00+00:00");
        assert!(due_date(&action(json!({"dueDate": "soon"}))).is_none());
        assert!(due_date(&action(json!({}))).is_none());
    }

    #[test]
    fn blank_message_falls_back() {
        let a = action(json!({}));
        assert_eq!(message_or(&a, "fallback".to_string()), "fallback");
    }

    #[test]
    fn status_metadata_must_name_a_known_value() {
        let ok = action(json!({"status": "QUALIFIED"}));
        assert_eq!(meta_enum::<LeadStatus>(&ok, "status").unwrap(), Some(LeadStatus::Qualified));

        let bad = action(json!({"status": "ARCHIVED"}));
        assert!(meta_enum::<LeadStatus>(&bad, "status").is_err());
    }
}
