use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    Call,
    Email,
    Meeting,
    Note,
    Task,
    FollowUp,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub assigned_user_id: Uuid,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub title: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub const ACTIVITY_COLUMNS: &str =
    "id, lead_id, client_id, assigned_user_id, activity_type, title, description, occurred_at, created_at";
