use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FollowUp {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub assigned_user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_date: DateTime<Utc>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub last_escalation_level: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const FOLLOW_UP_COLUMNS: &str = "id, lead_id, client_id, assigned_user_id, title, description, \
     scheduled_date, completed, completed_at, notes, last_escalation_level, created_at, updated_at";
