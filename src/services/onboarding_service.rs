use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::models::client::Client;
use crate::database::models::onboarding::{
    FieldType, FormField, OnboardingForm, OnboardingFormListItem, OnboardingSubmission, PublicForm,
    FORM_COLUMNS, SUBMISSION_COLUMNS,
};
use crate::middleware::AuthUser;
use crate::services::client_service::{insert_client, NewClient};
use crate::services::double_option;
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use crate::services::non_blank;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormInput {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFormInput {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub fields: Option<Vec<FormField>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitFormInput {
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Submission row with the title of its form
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionListItem {
    pub id: Uuid,
    pub form_id: Uuid,
    pub form_title: String,
    pub data: Value,
    pub client_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

fn validate_fields(errors: &mut FieldErrors, fields: &[FormField]) {
    if fields.is_empty() {
        errors.add("fields", "At least one field is required");
        return;
    }
    let mut seen = HashSet::new();
    for field in fields {
        if field.key.trim().is_empty() || field.label.trim().is_empty() {
            errors.add("fields", "Every field needs a key and a label");
        } else if !seen.insert(field.key.trim()) {
            errors.add("fields", format!("Duplicate field key: {}", field.key.trim()));
        }
    }
}

/// Each value must be a string, a number or an array of strings, and every
/// required input field must carry a non-empty value.
pub fn validate_submission(fields: &[FormField], data: &Map<String, Value>) -> ServiceResult<()> {
    let mut errors = FieldErrors::new();

    for (key, value) in data {
        let ok = match value {
            Value::String(_) | Value::Number(_) => true,
            Value::Array(items) => items.iter().all(Value::is_string),
            _ => false,
        };
        if !ok {
            errors.add(key, "Value must be a string, number or list of strings");
        }
    }

    for field in fields.iter().filter(|f| f.required && f.field_type != FieldType::Section) {
        let present = match data.get(&field.key) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Number(_)) => true,
            _ => false,
        };
        if !present {
            errors.add(&field.key, format!("{} is required", field.label));
        }
    }

    errors.into_result()
}

struct SubmissionData<'a>(&'a Map<String, Value>);

impl SubmissionData<'_> {
    fn text(&self, key: &str) -> Option<String> {
        let raw = match self.0.get(key)? {
            Value::Null => return None,
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        };
        non_blank(Some(&raw))
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.text(k))
    }

    fn list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => non_blank(Some(s)),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .filter_map(|part| non_blank(Some(part)))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }
}

/// Build client fields from the well-known keys of a submission
pub fn map_submission_to_client(data: &Map<String, Value>, assigned_user_id: Uuid) -> NewClient {
    let d = SubmissionData(data);

    let full_name = d.text("fullName");
    let mut name_parts = full_name.as_deref().unwrap_or_default().split_whitespace();
    let full_first = name_parts.next().map(str::to_string);
    let full_rest = {
        let rest: Vec<&str> = name_parts.collect();
        (!rest.is_empty()).then(|| rest.join(" "))
    };

    let first_name = d
        .first(&["firstName", "first_name"])
        .or(full_first)
        .unwrap_or_else(|| "Client".to_string());
    let last_name = d
        .first(&["lastName", "last_name"])
        .or(full_rest)
        .unwrap_or_else(|| "Name".to_string());
    let contact_name = format!("{} {}", first_name, last_name);

    let mut skills = d.list("skills");
    if skills.is_empty() {
        if let Some(objective) = d.text("careerObjective") {
            skills.push(objective);
        }
    }

    let experience = d.text("experience");
    let experience_years = experience.as_deref().and_then(leading_number);

    let labelled: [(&str, &str); 10] = [
        ("careerObjective", "Career"),
        ("targetRole", "Target role"),
        ("targetIndustry", "Target industry"),
        ("targetLocation", "Target location"),
        ("currentCtc", "Current CTC"),
        ("expectedCtc", "Expected CTC"),
        ("noticePeriod", "Notice"),
        ("dateOfBirth", "DOB"),
        ("panCardNo", "PAN"),
        ("aadharCardNo", "Aadhar"),
    ];
    let mut notes: Vec<String> = labelled
        .iter()
        .filter_map(|(key, label)| d.text(key).map(|v| format!("{}: {}", label, v)))
        .collect();
    if let Some(exp) = experience.as_ref().filter(|_| experience_years.is_none()) {
        notes.push(format!("Experience: {}", exp));
    }
    if let Some(history) = d.raw("employmentHistory") {
        notes.push(format!("Employment: {}", history));
    }
    if let Some(education) = d.raw("education") {
        notes.push(format!("Education: {}", education));
    }

    NewClient {
        company_name: d
            .first(&["currentCompany", "companyName", "company"])
            .unwrap_or_else(|| contact_name.clone()),
        contact_name,
        first_name: Some(first_name),
        last_name: Some(last_name),
        email: d.first(&["email", "linkedinId"]),
        phone: d.first(&["phone", "mobile", "contact"]),
        address: d.first(&["address", "fullHomeAddr", "currentLocation"]),
        industry: d.first(&["currentIndustry", "targetIndustry", "industry"]),
        website: None,
        current_job_title: d.first(&["currentRole", "designation", "currentJobTitle"]),
        experience_years,
        skills,
        notes: (!notes.is_empty()).then(|| notes.join("\n")),
        assigned_user_id: Some(assigned_user_id),
        lead_id: None,
    }
}

fn leading_number(text: &str) -> Option<i32> {
    let digits: String = text.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

pub struct OnboardingService {
    pool: PgPool,
}

impl OnboardingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, caller: &AuthUser, input: CreateFormInput) -> ServiceResult<OnboardingForm> {
        let mut errors = FieldErrors::new();
        errors.require("title", Some(&input.title), "Title is required");
        validate_fields(&mut errors, &input.fields);
        errors.into_result()?;

        let form = sqlx::query_as::<_, OnboardingForm>(&format!(
            "INSERT INTO onboarding_forms (title, description, fields, created_by) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            FORM_COLUMNS
        ))
        .bind(input.title.trim())
        .bind(non_blank(input.description.as_deref()))
        .bind(Json(&input.fields))
        .bind(caller.user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(form)
    }

    pub async fn find(&self, id: Uuid) -> ServiceResult<OnboardingForm> {
        find_form(&self.pool, id).await
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<OnboardingForm> {
        let form = self.find(id).await?;
        caller.ensure_access(form.created_by)?;
        Ok(form)
    }

    /// Most recently updated first
    pub async fn list(&self, caller: &AuthUser) -> ServiceResult<Vec<OnboardingFormListItem>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT f.id, f.title, f.description, f.fields, f.is_active, f.created_by, \
             (SELECT COUNT(*) FROM onboarding_form_submissions s WHERE s.form_id = f.id) AS submission_count, \
             f.created_at, f.updated_at FROM onboarding_forms f WHERE 1=1",
        );
        if let Some(owner) = caller.owner_scope() {
            query.push(" AND f.created_by = ").push_bind(owner);
        }
        query.push(" ORDER BY f.updated_at DESC");
        Ok(query
            .build_query_as::<OnboardingFormListItem>()
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: Uuid,
        patch: UpdateFormInput,
    ) -> ServiceResult<(OnboardingForm, OnboardingForm)> {
        let existing = self.get(caller, id).await?;

        let mut errors = FieldErrors::new();
        if patch.title.is_some() {
            errors.require("title", patch.title.as_deref(), "Title is required");
        }
        if let Some(fields) = &patch.fields {
            validate_fields(&mut errors, fields);
        }
        errors.into_result()?;

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE onboarding_forms SET updated_at = NOW()");
        if let Some(title) = patch.title {
            query.push(", title = ").push_bind(title.trim().to_string());
        }
        if let Some(description) = patch.description {
            query
                .push(", description = ")
                .push_bind(non_blank(description.as_deref()));
        }
        if let Some(fields) = patch.fields {
            query.push(", fields = ").push_bind(Json(fields));
        }
        if let Some(active) = patch.is_active {
            query.push(", is_active = ").push_bind(active);
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", FORM_COLUMNS));

        let updated = query.build_query_as::<OnboardingForm>().fetch_one(&self.pool).await?;
        Ok((existing, updated))
    }

    pub async fn delete(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<OnboardingForm> {
        let form = self.get(caller, id).await?;
        sqlx::query("DELETE FROM onboarding_forms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(form)
    }

    /// Unauthenticated view; inactive forms are hidden
    pub async fn public_view(&self, id: Uuid) -> ServiceResult<PublicForm> {
        let form = self.find(id).await?;
        if !form.is_active {
            return Err(ServiceError::not_found("Form"));
        }
        Ok(form.into())
    }

    pub async fn submit(&self, form_id: Uuid, input: SubmitFormInput) -> ServiceResult<OnboardingSubmission> {
        let form = self.public_view(form_id).await?;
        validate_submission(&form.fields, &input.data)?;

        let submission = sqlx::query_as::<_, OnboardingSubmission>(&format!(
            "INSERT INTO onboarding_form_submissions (form_id, data) VALUES ($1, $2) RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(form_id)
        .bind(Value::Object(input.data))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(form_id = %form_id, submission_id = %submission.id, "onboarding form submitted");
        Ok(submission)
    }

    /// Callers who cannot see the form get an empty list
    pub async fn submissions_for_form(
        &self,
        caller: &AuthUser,
        form_id: Uuid,
    ) -> ServiceResult<Vec<OnboardingSubmission>> {
        let form = match self.find(form_id).await {
            Ok(form) => form,
            Err(ServiceError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if !caller.can_access(form.created_by) {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, OnboardingSubmission>(&format!(
            "SELECT {} FROM onboarding_form_submissions WHERE form_id = $1 ORDER BY created_at DESC",
            SUBMISSION_COLUMNS
        ))
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn all_submissions(&self, caller: &AuthUser) -> ServiceResult<Vec<SubmissionListItem>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT s.id, s.form_id, f.title AS form_title, s.data, s.client_id, s.created_at \
             FROM onboarding_form_submissions s JOIN onboarding_forms f ON f.id = s.form_id WHERE 1=1",
        );
        if let Some(owner) = caller.owner_scope() {
            query.push(" AND f.created_by = ").push_bind(owner);
        }
        query.push(" ORDER BY s.created_at DESC");
        Ok(query
            .build_query_as::<SubmissionListItem>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// The submission row stays locked until the client is linked, so two
    /// concurrent conversions cannot both create a client.
    pub async fn create_client_from_submission(
        &self,
        caller: &AuthUser,
        submission_id: Uuid,
        assigned_user_id: Option<Uuid>,
    ) -> ServiceResult<(OnboardingSubmission, Client)> {
        let mut tx = self.pool.begin().await?;

        let submission = sqlx::query_as::<_, OnboardingSubmission>(&format!(
            "SELECT {} FROM onboarding_form_submissions WHERE id = $1 FOR UPDATE",
            SUBMISSION_COLUMNS
        ))
        .bind(submission_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::not_found("Submission"))?;

        let form = find_form(&mut *tx, submission.form_id).await?;
        caller.ensure_access(form.created_by)?;

        if submission.client_id.is_some() {
            return Err(already_converted());
        }

        let assigned = assigned_user_id.unwrap_or(caller.user_id);
        if assigned != caller.user_id && !caller.is_privileged() {
            return Err(ServiceError::forbidden());
        }

        let empty = Map::new();
        let data = submission.data.as_object().unwrap_or(&empty);
        let client = insert_client(&mut *tx, map_submission_to_client(data, assigned)).await?;

        let linked = sqlx::query_as::<_, OnboardingSubmission>(&format!(
            "UPDATE onboarding_form_submissions SET client_id = $2 \
             WHERE id = $1 AND client_id IS NULL RETURNING {}",
            SUBMISSION_COLUMNS
        ))
        .bind(submission_id)
        .bind(client.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(already_converted)?;

        tx.commit().await?;
        tracing::info!(submission_id = %submission_id, client_id = %client.id, "submission converted to client");
        Ok((linked, client))
    }
}

async fn find_form<'e, E>(executor: E, id: Uuid) -> ServiceResult<OnboardingForm>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, OnboardingForm>(&format!(
        "SELECT {} FROM onboarding_forms WHERE id = $1",
        FORM_COLUMNS
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| ServiceError::not_found("Form"))
}

fn already_converted() -> ServiceError {
    ServiceError::Conflict("This submission was already converted to a client".to_string())
}
