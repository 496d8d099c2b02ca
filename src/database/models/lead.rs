use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lead_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Lost,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: Uuid,
    pub company_name: String,
    pub contact_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub source: Option<String>,
    pub industry: Option<String>,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
    pub assigned_user_id: Uuid,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const LEAD_COLUMNS: &str = "id, company_name, contact_name, email, phone, status, source, industry, \
     estimated_value, notes, assigned_user_id, converted_at, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeadDocument {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub checksum: String,
    pub url: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

pub const LEAD_DOCUMENT_COLUMNS: &str = "id, lead_id, original_name, stored_name, content_type, \
     size_bytes, checksum, url, uploaded_by, created_at";
