use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::models::job::{Job, JobSource, JOB_COLUMNS};
use crate::middleware::AuthUser;
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use crate::services::non_blank;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default)]
    pub recruiter_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJobInput {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub job_url: Option<String>,
    pub recruiter_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateJobsInput {
    #[serde(default)]
    pub jobs: Vec<CreateJobInput>,
}

#[derive(Debug, Serialize)]
pub struct BulkCreateResult {
    pub count: u64,
}

/// Validated, normalized job ready for insert
#[derive(Debug, Clone, PartialEq)]
pub struct JobDraft {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub source: JobSource,
    pub job_url: Option<String>,
    pub recruiter_id: Uuid,
}

impl CreateJobInput {
    /// `recruiter_id` is the already-resolved owner of the job.
    pub fn into_draft(self, recruiter_id: Uuid) -> ServiceResult<JobDraft> {
        let mut errors = FieldErrors::new();
        errors.require("title", Some(&self.title), "Title is required");
        errors.require("company", Some(&self.company), "Company is required");
        errors.require("location", Some(&self.location), "Location is required");
        errors.require("description", Some(&self.description), "Description is required");

        let source = match non_blank(self.source.as_deref()) {
            Some(raw) => match raw.parse::<JobSource>() {
                Ok(source) => source,
                Err(message) => {
                    errors.add("source", message);
                    JobSource::Other
                }
            },
            None => JobSource::Other,
        };
        errors.into_result()?;

        Ok(JobDraft {
            title: self.title.trim().to_string(),
            company: self.company.trim().to_string(),
            location: self.location.trim().to_string(),
            description: self.description.trim().to_string(),
            source,
            job_url: non_blank(self.job_url.as_deref()),
            recruiter_id,
        })
    }
}

pub struct JobService {
    pool: PgPool,
}

impl JobService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, caller: &AuthUser, input: CreateJobInput) -> ServiceResult<Job> {
        let recruiter_id = match input.recruiter_id {
            Some(id) if id != caller.user_id && !caller.is_privileged() => {
                return Err(ServiceError::Forbidden(
                    "Only managers and admins can assign jobs to other recruiters".to_string(),
                ));
            }
            Some(id) => id,
            None => caller.user_id,
        };
        let draft = input.into_draft(recruiter_id)?;

        let result = sqlx::query_as::<_, Job>(&format!(
            "INSERT INTO jobs (title, company, location, description, source, job_url, recruiter_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            JOB_COLUMNS
        ))
        .bind(&draft.title)
        .bind(&draft.company)
        .bind(&draft.location)
        .bind(&draft.description)
        .bind(draft.source)
        .bind(&draft.job_url)
        .bind(draft.recruiter_id)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(job) => Ok(job),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(ServiceError::Conflict(
                "A job with this URL already exists".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Job> {
        let job = self.find(id).await?;
        caller.ensure_access(job.recruiter_id)?;
        Ok(job)
    }

    pub async fn find(&self, id: Uuid) -> ServiceResult<Job> {
        sqlx::query_as::<_, Job>(&format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Job"))
    }

    /// Privileged callers see every job; recruiters see their own. Newest first.
    pub async fn list(&self, caller: &AuthUser) -> ServiceResult<Vec<Job>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM jobs", JOB_COLUMNS));
        if let Some(owner) = caller.owner_scope() {
            query.push(" WHERE recruiter_id = ").push_bind(owner);
        }
        query.push(" ORDER BY created_at DESC");
        Ok(query.build_query_as::<Job>().fetch_all(&self.pool).await?)
    }

    /// Returns the job before and after the change
    pub async fn update(&self, caller: &AuthUser, id: Uuid, patch: UpdateJobInput) -> ServiceResult<(Job, Job)> {
        let existing = self.get(caller, id).await?;

        let mut errors = FieldErrors::new();
        for (field, value, message) in [
            ("title", &patch.title, "Title is required"),
            ("company", &patch.company, "Company is required"),
            ("location", &patch.location, "Location is required"),
            ("description", &patch.description, "Description is required"),
        ] {
            if value.is_some() {
                errors.require(field, value.as_deref(), message);
            }
        }
        let source = match patch.source.as_deref() {
            Some(raw) => match raw.parse::<JobSource>() {
                Ok(source) => Some(source),
                Err(message) => {
                    errors.add("source", message);
                    None
                }
            },
            None => None,
        };
        if let Some(recruiter_id) = patch.recruiter_id {
            if recruiter_id != existing.recruiter_id && !caller.is_privileged() {
                errors.add("recruiterId", "Only managers and admins can reassign jobs");
            }
        }
        errors.into_result()?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE jobs SET updated_at = NOW()");
        if let Some(title) = patch.title {
            query.push(", title = ").push_bind(title.trim().to_string());
        }
        if let Some(company) = patch.company {
            query.push(", company = ").push_bind(company.trim().to_string());
        }
        if let Some(location) = patch.location {
            query.push(", location = ").push_bind(location.trim().to_string());
        }
        if let Some(description) = patch.description {
            query.push(", description = ").push_bind(description.trim().to_string());
        }
        if let Some(source) = source {
            query.push(", source = ").push_bind(source);
        }
        if let Some(job_url) = patch.job_url {
            query.push(", job_url = ").push_bind(non_blank(Some(&job_url)));
        }
        if let Some(recruiter_id) = patch.recruiter_id {
            query.push(", recruiter_id = ").push_bind(recruiter_id);
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", JOB_COLUMNS));

        let updated = query.build_query_as::<Job>().fetch_one(&self.pool).await?;
        Ok((existing, updated))
    }

    pub async fn delete(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Job> {
        let job = self.get(caller, id).await?;
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(job)
    }

    /// Every job is owned by the caller; rows whose jobUrl already exists are skipped.
    pub async fn bulk_create(&self, caller: &AuthUser, input: BulkCreateJobsInput) -> ServiceResult<BulkCreateResult> {
        if input.jobs.is_empty() {
            return Err(ServiceError::field("jobs", "At least one job is required"));
        }

        let mut drafts = Vec::with_capacity(input.jobs.len());
        for (index, job) in input.jobs.into_iter().enumerate() {
            let draft = job.into_draft(caller.user_id).map_err(|e| match e {
                ServiceError::Validation { field_errors, .. } => ServiceError::Validation {
                    message: format!("Job {} is invalid", index + 1),
                    field_errors,
                },
                other => other,
            })?;
            drafts.push(draft);
        }

        let mut tx = self.pool.begin().await?;
        let mut count = 0;
        for draft in &drafts {
            let result = sqlx::query(
                "INSERT INTO jobs (title, company, location, description, source, job_url, recruiter_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (job_url) WHERE job_url IS NOT NULL DO NOTHING",
            )
            .bind(&draft.title)
            .bind(&draft.company)
            .bind(&draft.location)
            .bind(&draft.description)
            .bind(draft.source)
            .bind(&draft.job_url)
            .bind(draft.recruiter_id)
            .execute(&mut *tx)
            .await?;
            count += result.rows_affected();
        }
        tx.commit().await?;

        tracing::info!(
            recruiter_id = %caller.user_id,
            submitted = drafts.len(),
            created = count,
            "bulk job import"
        );
        Ok(BulkCreateResult { count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(value: serde_json::Value) -> CreateJobInput {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn draft_normalizes_source_and_url() {
        let recruiter = Uuid::new_v4();
        let draft = input(json!({
            "title": " Backend Engineer ",
            "company": "Acme",
            "location": "Pune",
            "description": "Rust services",
            "source": "linkedin",
            "jobUrl": "  "
        }))
        .into_draft(recruiter)
        .unwrap();

        assert_eq!(draft.title, "Backend Engineer");
        assert_eq!(draft.source, JobSource::Linkedin);
        assert_eq!(draft.job_url, None);
        assert_eq!(draft.recruiter_id, recruiter);
    }

    #[test]
    fn draft_reports_missing_fields() {
        let err = input(json!({"title": "Only title", "source": "monster"}))
            .into_draft(Uuid::new_v4())
            .unwrap_err();
        match err {
            ServiceError::Validation { field_errors: Some(fields), .. } => {
                assert!(fields.contains_key("company"));
                assert!(fields.contains_key("location"));
                assert!(fields.contains_key("description"));
                assert!(fields.contains_key("source"));
                assert!(!fields.contains_key("title"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_source_defaults_to_other() {
        let draft = input(json!({
            "title": "t", "company": "c", "location": "l", "description": "d"
        }))
        .into_draft(Uuid::new_v4())
        .unwrap();
        assert_eq!(draft.source, JobSource::Other);
    }
}
