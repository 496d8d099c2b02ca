use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Phone,
    Number,
    Textarea,
    Select,
    /// Layout-only heading; never carries a value
    Section,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub id: String,
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingForm {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub fields: Json<Vec<FormField>>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const FORM_COLUMNS: &str =
    "id, title, description, fields, is_active, created_by, created_at, updated_at";

/// Form row for listings, with its submission count
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingFormListItem {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub fields: Json<Vec<FormField>>,
    pub is_active: bool,
    pub created_by: Uuid,
    pub submission_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingSubmission {
    pub id: Uuid,
    pub form_id: Uuid,
    pub data: Value,
    pub client_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

pub const SUBMISSION_COLUMNS: &str = "id, form_id, data, client_id, created_at";

/// Public view of a form, safe to show unauthenticated visitors
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicForm {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub fields: Vec<FormField>,
}

impl From<OnboardingForm> for PublicForm {
    fn from(form: OnboardingForm) -> Self {
        Self {
            id: form.id,
            title: form.title,
            description: form.description,
            fields: form.fields.0,
        }
    }
}
