use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::models::application::{
    Application, ApplicationStage, ReminderState, APPLICATION_COLUMNS,
};
use crate::middleware::AuthUser;
use crate::services::client_service::ClientService;
use crate::services::double_option;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::non_blank;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationInput {
    pub client_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub recruiter_id: Option<Uuid>,
    #[serde(default)]
    pub stage: Option<ApplicationStage>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub follow_up_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApplicationInput {
    pub stage: Option<ApplicationStage>,
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub follow_up_date: Option<Option<DateTime<Utc>>>,
}

pub struct ApplicationService {
    pool: PgPool,
}

impl ApplicationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, caller: &AuthUser, input: CreateApplicationInput) -> ServiceResult<Application> {
        // Client must exist and be visible to the caller
        ClientService::new(self.pool.clone())
            .get(caller, input.client_id)
            .await?;

        if let Some(job_id) = input.job_id {
            let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM jobs WHERE id = $1)")
                .bind(job_id)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(ServiceError::field("jobId", "Job not found"));
            }
        }

        let recruiter_id = input.recruiter_id.unwrap_or(caller.user_id);
        if recruiter_id != caller.user_id && !caller.is_privileged() {
            return Err(ServiceError::forbidden());
        }

        let application = sqlx::query_as::<_, Application>(&format!(
            "INSERT INTO applications (job_id, client_id, recruiter_id, stage, notes, follow_up_date) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            APPLICATION_COLUMNS
        ))
        .bind(input.job_id)
        .bind(input.client_id)
        .bind(recruiter_id)
        .bind(input.stage.unwrap_or(ApplicationStage::Identified))
        .bind(non_blank(input.notes.as_deref()))
        .bind(input.follow_up_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(application)
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Application> {
        let application = self.find(id).await?;
        caller.ensure_access(application.recruiter_id)?;
        Ok(application)
    }

    pub async fn find(&self, id: Uuid) -> ServiceResult<Application> {
        sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM applications WHERE id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Application"))
    }

    pub async fn list(&self, caller: &AuthUser, stage: Option<ApplicationStage>) -> ServiceResult<Vec<Application>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM applications WHERE 1=1", APPLICATION_COLUMNS));
        if let Some(owner) = caller.owner_scope() {
            query.push(" AND recruiter_id = ").push_bind(owner);
        }
        if let Some(stage) = stage {
            query.push(" AND stage = ").push_bind(stage);
        }
        query.push(" ORDER BY created_at DESC");
        Ok(query.build_query_as::<Application>().fetch_all(&self.pool).await?)
    }

    /// Returns the application before and after the change
    pub async fn update(
        &self,
        caller: &AuthUser,
        id: Uuid,
        patch: UpdateApplicationInput,
    ) -> ServiceResult<(Application, Application)> {
        let existing = self.get(caller, id).await?;

        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE applications SET updated_at = NOW()");
        if let Some(stage) = patch.stage {
            query.push(", stage = ").push_bind(stage);
        }
        if let Some(notes) = patch.notes {
            query.push(", notes = ").push_bind(non_blank(Some(&notes)));
        }
        if let Some(follow_up_date) = patch.follow_up_date {
            query.push(", follow_up_date = ").push_bind(follow_up_date);
            if follow_up_date != existing.follow_up_date {
                query.push(", reminder_state = NULL");
            }
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", APPLICATION_COLUMNS));

        let updated = query.build_query_as::<Application>().fetch_one(&self.pool).await?;
        Ok((existing, updated))
    }

    /// Open applications whose follow-up date has passed or falls before `horizon`
    pub async fn due_for_reminder(&self, horizon: DateTime<Utc>) -> ServiceResult<Vec<Application>> {
        let rows = sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM applications \
             WHERE follow_up_date IS NOT NULL AND follow_up_date <= $1 \
             AND stage NOT IN ('CLOSED', 'REJECTED') \
             ORDER BY follow_up_date ASC",
            APPLICATION_COLUMNS
        ))
        .bind(horizon)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Moves `reminder_state` from `seen` to `state`. Returns false when another
    /// run already changed it, in which case no reminder should go out.
    pub async fn claim_reminder_state(
        &self,
        id: Uuid,
        seen: Option<&str>,
        state: ReminderState,
    ) -> ServiceResult<bool> {
        let claimed = sqlx::query(
            "UPDATE applications SET reminder_state = $3 \
             WHERE id = $1 AND reminder_state IS NOT DISTINCT FROM $2 RETURNING id",
        )
        .bind(id)
        .bind(seen)
        .bind(state.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed.is_some())
    }

    pub async fn delete(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Application> {
        let application = self.get(caller, id).await?;
        sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(application)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn follow_up_date_can_be_cleared() {
        let patch: UpdateApplicationInput =
            serde_json::from_value(json!({"followUpDate": null})).unwrap();
        assert_eq!(patch.follow_up_date, Some(None));

        let patch: UpdateApplicationInput =
            serde_json::from_value(json!({"stage": "APPLIED"})).unwrap();
        assert_eq!(patch.stage, Some(ApplicationStage::Applied));
        assert!(patch.follow_up_date.is_none());
    }
}
