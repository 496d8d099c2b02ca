use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::models::lead::{Lead, LeadStatus, LEAD_COLUMNS};
use crate::middleware::AuthUser;
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use crate::services::{is_valid_email, non_blank};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadInput {
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub contact_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub industry: Option<String>,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
    pub assigned_user_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLeadInput {
    pub company_name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<LeadStatus>,
    pub source: Option<String>,
    pub industry: Option<String>,
    pub estimated_value: Option<f64>,
    pub notes: Option<String>,
    pub assigned_user_id: Option<Uuid>,
}

fn check_email(errors: &mut FieldErrors, email: Option<&str>) {
    if let Some(email) = non_blank(email) {
        if !is_valid_email(&email) {
            errors.add("email", "Invalid email address");
        }
    }
}

fn check_value(errors: &mut FieldErrors, value: Option<f64>) {
    if let Some(value) = value {
        if !(value.is_finite() && value > 0.0) {
            errors.add("estimatedValue", "Estimated value must be positive");
        }
    }
}

pub struct LeadService {
    pool: PgPool,
}

impl LeadService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, caller: &AuthUser, input: CreateLeadInput) -> ServiceResult<Lead> {
        let mut errors = FieldErrors::new();
        errors.require("companyName", Some(&input.company_name), "Company name is required");
        errors.require("contactName", Some(&input.contact_name), "Contact name is required");
        check_email(&mut errors, input.email.as_deref());
        check_value(&mut errors, input.estimated_value);
        errors.into_result()?;

        let assigned = input.assigned_user_id.unwrap_or(caller.user_id);
        if assigned != caller.user_id && !caller.is_privileged() {
            return Err(ServiceError::forbidden());
        }

        let lead = sqlx::query_as::<_, Lead>(&format!(
            "INSERT INTO leads (company_name, contact_name, email, phone, source, industry, \
             estimated_value, notes, assigned_user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            LEAD_COLUMNS
        ))
        .bind(input.company_name.trim())
        .bind(input.contact_name.trim())
        .bind(non_blank(input.email.as_deref()))
        .bind(non_blank(input.phone.as_deref()))
        .bind(non_blank(input.source.as_deref()))
        .bind(non_blank(input.industry.as_deref()))
        .bind(input.estimated_value)
        .bind(non_blank(input.notes.as_deref()))
        .bind(assigned)
        .fetch_one(&self.pool)
        .await?;

        Ok(lead)
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Lead> {
        let lead = self.find(id).await?;
        caller.ensure_access(lead.assigned_user_id)?;
        Ok(lead)
    }

    pub async fn find(&self, id: Uuid) -> ServiceResult<Lead> {
        sqlx::query_as::<_, Lead>(&format!("SELECT {} FROM leads WHERE id = $1", LEAD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lead"))
    }

    pub async fn list(&self, caller: &AuthUser, status: Option<LeadStatus>) -> ServiceResult<Vec<Lead>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM leads WHERE 1=1", LEAD_COLUMNS));
        if let Some(owner) = caller.owner_scope() {
            query.push(" AND assigned_user_id = ").push_bind(owner);
        }
        if let Some(status) = status {
            query.push(" AND status = ").push_bind(status);
        }
        query.push(" ORDER BY created_at DESC");
        Ok(query.build_query_as::<Lead>().fetch_all(&self.pool).await?)
    }

    /// Returns the lead before and after the change
    pub async fn update(&self, caller: &AuthUser, id: Uuid, patch: UpdateLeadInput) -> ServiceResult<(Lead, Lead)> {
        let existing = self.get(caller, id).await?;

        let mut errors = FieldErrors::new();
        if patch.company_name.is_some() {
            errors.require("companyName", patch.company_name.as_deref(), "Company name is required");
        }
        if patch.contact_name.is_some() {
            errors.require("contactName", patch.contact_name.as_deref(), "Contact name is required");
        }
        check_email(&mut errors, patch.email.as_deref());
        check_value(&mut errors, patch.estimated_value);
        errors.into_result()?;

        if let Some(assigned) = patch.assigned_user_id {
            if assigned != existing.assigned_user_id && !caller.is_privileged() {
                return Err(ServiceError::forbidden());
            }
        }

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE leads SET updated_at = NOW()");
        if let Some(v) = patch.company_name {
            query.push(", company_name = ").push_bind(v.trim().to_string());
        }
        if let Some(v) = patch.contact_name {
            query.push(", contact_name = ").push_bind(v.trim().to_string());
        }
        if let Some(v) = patch.email {
            query.push(", email = ").push_bind(non_blank(Some(&v)));
        }
        if let Some(v) = patch.phone {
            query.push(", phone = ").push_bind(non_blank(Some(&v)));
        }
        if let Some(v) = patch.source {
            query.push(", source = ").push_bind(non_blank(Some(&v)));
        }
        if let Some(v) = patch.industry {
            query.push(", industry = ").push_bind(non_blank(Some(&v)));
        }
        if let Some(v) = patch.estimated_value {
            query.push(", estimated_value = ").push_bind(v);
        }
        if let Some(v) = patch.notes {
            query.push(", notes = ").push_bind(non_blank(Some(&v)));
        }
        if let Some(v) = patch.assigned_user_id {
            query.push(", assigned_user_id = ").push_bind(v);
        }
        if let Some(status) = patch.status {
            query.push(", status = ").push_bind(status);
            if status == LeadStatus::Qualified && existing.status != LeadStatus::Qualified {
                query.push(", converted_at = COALESCE(converted_at, NOW())");
            }
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", LEAD_COLUMNS));

        let updated = query.build_query_as::<Lead>().fetch_one(&self.pool).await?;
        Ok((existing, updated))
    }

    pub async fn delete(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Lead> {
        let lead = self.get(caller, id).await?;
        sqlx::query("DELETE FROM leads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_must_be_positive() {
        let mut errors = FieldErrors::new();
        check_value(&mut errors, Some(-5.0));
        assert!(!errors.is_empty());

        let mut errors = FieldErrors::new();
        check_value(&mut errors, Some(1200.0));
        check_email(&mut errors, Some(""));
        assert!(errors.is_empty());
    }

    #[test]
    fn invalid_email_is_flagged() {
        let mut errors = FieldErrors::new();
        check_email(&mut errors, Some("nope"));
        assert!(errors.into_result().is_err());
    }
}
