use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::models::client::{Client, ClientStatus, CLIENT_COLUMNS};
use crate::middleware::AuthUser;
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use crate::services::{is_valid_email, non_blank};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
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
    #[serde(default)]
    pub skills: Vec<String>,
    pub notes: Option<String>,
    pub assigned_user_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
}

impl NewClient {
    pub fn validate(&self) -> ServiceResult<()> {
        let mut errors = FieldErrors::new();
        errors.require("companyName", Some(&self.company_name), "Company name is required");
        errors.require("contactName", Some(&self.contact_name), "Contact name is required");
        if let Some(email) = non_blank(self.email.as_deref()) {
            if !is_valid_email(&email) {
                errors.add("email", "Invalid email address");
            }
        }
        if let Some(website) = non_blank(self.website.as_deref()) {
            if url::Url::parse(&website).is_err() {
                errors.add("website", "Invalid URL");
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientInput {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub current_job_title: Option<String>,
    pub experience_years: Option<i32>,
    pub skills: Option<Vec<String>>,
    pub notes: Option<String>,
    pub status: Option<ClientStatus>,
    pub assigned_user_id: Option<Uuid>,
}

impl UpdateClientInput {
    pub fn validate(&self) -> ServiceResult<()> {
        let mut errors = FieldErrors::new();
        if self.company_name.is_some() {
            errors.require("companyName", self.company_name.as_deref(), "Company name is required");
        }
        if self.contact_name.is_some() {
            errors.require("contactName", self.contact_name.as_deref(), "Contact name is required");
        }
        if let Some(email) = non_blank(self.email.as_deref()) {
            if !is_valid_email(&email) {
                errors.add("email", "Invalid email address");
            }
        }
        if let Some(website) = non_blank(self.website.as_deref()) {
            if url::Url::parse(&website).is_err() {
                errors.add("website", "Invalid URL");
            }
        }
        if matches!(self.experience_years, Some(years) if years < 0) {
            errors.add("experienceYears", "Experience cannot be negative");
        }
        errors.into_result()
    }
}

fn clean_skills(skills: &[String]) -> Vec<String> {
    skills
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Insert on any executor so callers can run it inside their own transaction.
/// `assigned_user_id` must be set.
pub async fn insert_client<'e, E>(executor: E, input: NewClient) -> ServiceResult<Client>
where
    E: PgExecutor<'e>,
{
    input.validate()?;
    let assigned = input
        .assigned_user_id
        .ok_or_else(|| ServiceError::field("assignedUserId", "Assigned user ID is required"))?;

    let client = sqlx::query_as::<_, Client>(&format!(
        "INSERT INTO clients (company_name, contact_name, first_name, last_name, email, phone, address, \
         industry, website, current_job_title, experience_years, skills, notes, assigned_user_id, lead_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) RETURNING {}",
        CLIENT_COLUMNS
    ))
    .bind(input.company_name.trim())
    .bind(input.contact_name.trim())
    .bind(non_blank(input.first_name.as_deref()))
    .bind(non_blank(input.last_name.as_deref()))
    .bind(non_blank(input.email.as_deref()))
    .bind(non_blank(input.phone.as_deref()))
    .bind(non_blank(input.address.as_deref()))
    .bind(non_blank(input.industry.as_deref()))
    .bind(non_blank(input.website.as_deref()))
    .bind(non_blank(input.current_job_title.as_deref()))
    .bind(input.experience_years)
    .bind(Json(clean_skills(&input.skills)))
    .bind(non_blank(input.notes.as_deref()))
    .bind(assigned)
    .bind(input.lead_id)
    .fetch_one(executor)
    .await?;

    Ok(client)
}

pub struct ClientService {
    pool: PgPool,
}

impl ClientService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, caller: &AuthUser, input: NewClient) -> ServiceResult<Client> {
        let assigned = input.assigned_user_id.unwrap_or(caller.user_id);
        if assigned != caller.user_id && !caller.is_privileged() {
            return Err(ServiceError::forbidden());
        }
        self.insert(NewClient {
            assigned_user_id: Some(assigned),
            ..input
        })
        .await
    }

    /// Insert without an ownership check; `assigned_user_id` must be set
    pub async fn insert(&self, input: NewClient) -> ServiceResult<Client> {
        insert_client(&self.pool, input).await
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Client> {
        let client = self.find(id).await?;
        caller.ensure_access(client.assigned_user_id)?;
        Ok(client)
    }

    pub async fn find(&self, id: Uuid) -> ServiceResult<Client> {
        sqlx::query_as::<_, Client>(&format!("SELECT {} FROM clients WHERE id = $1", CLIENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Client"))
    }

    pub async fn list(&self, caller: &AuthUser, status: Option<ClientStatus>) -> ServiceResult<Vec<Client>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM clients WHERE 1=1", CLIENT_COLUMNS));
        if let Some(owner) = caller.owner_scope() {
            query.push(" AND assigned_user_id = ").push_bind(owner);
        }
        if let Some(status) = status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY created_at DESC");
        Ok(query.build_query_as::<Client>().fetch_all(&self.pool).await?)
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: Uuid,
        patch: UpdateClientInput,
    ) -> ServiceResult<(Client, Client)> {
        let existing = self.get(caller, id).await?;
        patch.validate()?;

        if let Some(assigned) = patch.assigned_user_id {
            if assigned != existing.assigned_user_id && !caller.is_privileged() {
                return Err(ServiceError::forbidden());
            }
        }

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE clients SET updated_at = NOW()");
        if let Some(v) = patch.company_name {
            query.push(", company_name = ").push_bind(v.trim().to_string());
        }
        if let Some(v) = patch.contact_name {
            query.push(", contact_name = ").push_bind(v.trim().to_string());
        }
        let optional_text = [
            ("first_name", patch.first_name),
            ("last_name", patch.last_name),
            ("email", patch.email),
            ("phone", patch.phone),
            ("address", patch.address),
            ("industry", patch.industry),
            ("website", patch.website),
            ("current_job_title", patch.current_job_title),
            ("notes", patch.notes),
        ];
        for (column, value) in optional_text {
            if let Some(v) = value {
                query.push(format!(", {} = ", column)).push_bind(non_blank(Some(&v)));
            }
        }
        if let Some(v) = patch.experience_years {
            query.push(", experience_years = ").push_bind(v);
        }
        if let Some(skills) = patch.skills {
            query.push(", skills = ").push_bind(Json(clean_skills(&skills)));
        }
        if let Some(status) = patch.status {
            query.push(", status = ").push_bind(status);
        }
        if let Some(v) = patch.assigned_user_id {
            query.push(", assigned_user_id = ").push_bind(v);
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", CLIENT_COLUMNS));

        let updated = query.build_query_as::<Client>().fetch_one(&self.pool).await?;
        Ok((existing, updated))
    }

    /// Applications, follow-ups and activities of the client go with it
    pub async fn delete(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Client> {
        let client = self.get(caller, id).await?;
        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_requires_names_and_checks_website() {
        let client = NewClient {
            company_name: "Acme".to_string(),
            contact_name: " ".to_string(),
            website: Some("not a url".to_string()),
            ..Default::default()
        };
        match client.validate() {
            Err(ServiceError::Validation { field_errors: Some(fields), .. }) => {
                assert!(fields.contains_key("contactName"));
                assert!(fields.contains_key("website"));
                assert!(!fields.contains_key("companyName"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn partial_update_only_checks_present_fields() {
        assert!(UpdateClientInput::default().validate().is_ok());

        let patch = UpdateClientInput {
            company_name: Some("  ".to_string()),
            email: Some("nope".to_string()),
            experience_years: Some(-1),
            ..Default::default()
        };
        match patch.validate() {
            Err(ServiceError::Validation { field_errors: Some(fields), .. }) => {
                assert!(fields.contains_key("companyName"));
                assert!(fields.contains_key("email"));
                assert!(fields.contains_key("experienceYears"));
                assert!(!fields.contains_key("contactName"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn update_payload_is_camel_case() {
        let patch: UpdateClientInput = serde_json::from_value(serde_json::json!({
            "currentJobTitle": "Lead",
            "status": "INACTIVE",
            "skills": [" rust ", ""]
        }))
        .unwrap();
        assert_eq!(patch.current_job_title.as_deref(), Some("Lead"));
        assert_eq!(patch.status, Some(ClientStatus::Inactive));
        assert_eq!(clean_skills(&patch.skills.unwrap()), vec!["rust".to_string()]);
    }
}
