use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "client_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub company_name: String,
    pub contact_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub current_job_title: Option<String>,
    pub experience_years: Option<i32>,
    pub skills: Json<Vec<String>>,
    pub notes: Option<String>,
    pub status: ClientStatus,
    pub assigned_user_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const CLIENT_COLUMNS: &str = "id, company_name, contact_name, first_name, last_name, email, phone, \
     address, industry, website, current_job_title, experience_years, skills, notes, status, \
     assigned_user_id, lead_id, created_at, updated_at";
