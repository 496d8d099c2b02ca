use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::models::follow_up::{FollowUp, FOLLOW_UP_COLUMNS};
use crate::middleware::AuthUser;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::{double_option, non_blank};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFollowUpInput {
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_user_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFollowUpInput {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    pub assigned_user_id: Option<Uuid>,
    pub completed: Option<bool>,
}

/// `[midnight, next midnight)` of the UTC day containing `now`
pub fn day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

pub struct FollowUpService {
    pool: PgPool,
}

impl FollowUpService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, caller: &AuthUser, input: CreateFollowUpInput) -> ServiceResult<FollowUp> {
        let assigned = input.assigned_user_id.unwrap_or(caller.user_id);
        if assigned != caller.user_id && !caller.is_privileged() {
            return Err(ServiceError::forbidden());
        }
        self.insert(assigned, input).await
    }

    /// Insert without an ownership check (rule engine, worker)
    pub async fn insert(&self, assigned_user_id: Uuid, input: CreateFollowUpInput) -> ServiceResult<FollowUp> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::field("title", "Title is required"));
        }

        let follow_up = sqlx::query_as::<_, FollowUp>(&format!(
            "INSERT INTO follow_ups (lead_id, client_id, assigned_user_id, title, description, scheduled_date, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            FOLLOW_UP_COLUMNS
        ))
        .bind(input.lead_id)
        .bind(input.client_id)
        .bind(assigned_user_id)
        .bind(input.title.trim())
        .bind(non_blank(input.description.as_deref()))
        .bind(input.scheduled_date)
        .bind(non_blank(input.notes.as_deref()))
        .fetch_one(&self.pool)
        .await?;

        Ok(follow_up)
    }

    /// Soonest first; `pending_only` hides completed follow-ups
    pub async fn list(&self, caller: &AuthUser, pending_only: bool) -> ServiceResult<Vec<FollowUp>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM follow_ups WHERE 1=1", FOLLOW_UP_COLUMNS));
        if let Some(owner) = caller.owner_scope() {
            query.push(" AND assigned_user_id = ").push_bind(owner);
        }
        if pending_only {
            query.push(" AND completed = FALSE");
        }
        query.push(" ORDER BY scheduled_date ASC");
        Ok(query.build_query_as::<FollowUp>().fetch_all(&self.pool).await?)
    }

    pub async fn complete(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<FollowUp> {
        let existing = self.find(id).await?;
        caller.ensure_access(existing.assigned_user_id)?;

        let follow_up = sqlx::query_as::<_, FollowUp>(&format!(
            "UPDATE follow_ups SET completed = TRUE, completed_at = COALESCE(completed_at, NOW()), \
             updated_at = NOW() WHERE id = $1 RETURNING {}",
            FOLLOW_UP_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(follow_up)
    }

    pub async fn find(&self, id: Uuid) -> ServiceResult<FollowUp> {
        sqlx::query_as::<_, FollowUp>(&format!("SELECT {} FROM follow_ups WHERE id = $1", FOLLOW_UP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Follow-up"))
    }

    /// Incomplete follow-ups scheduled before `now`
    pub async fn overdue(&self, now: DateTime<Utc>) -> ServiceResult<Vec<FollowUp>> {
        let rows = sqlx::query_as::<_, FollowUp>(&format!(
            "SELECT {} FROM follow_ups WHERE completed = FALSE AND scheduled_date < $1 \
             ORDER BY scheduled_date ASC",
            FOLLOW_UP_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_overdue(&self, now: DateTime<Utc>) -> ServiceResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM follow_ups WHERE completed = FALSE AND scheduled_date < $1",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Raises `last_escalation_level` to `level` unless a run already got
    /// there. Only the caller that gets `true` sends the escalation.
    pub async fn claim_escalation_level(&self, id: Uuid, level: i32) -> ServiceResult<bool> {
        let claimed = sqlx::query(
            "UPDATE follow_ups SET last_escalation_level = $2 \
             WHERE id = $1 AND last_escalation_level < $2 RETURNING id",
        )
        .bind(id)
        .bind(level)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed.is_some())
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<FollowUp> {
        let follow_up = self.find(id).await?;
        caller.ensure_access(follow_up.assigned_user_id)?;
        Ok(follow_up)
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: Uuid,
        patch: UpdateFollowUpInput,
    ) -> ServiceResult<(FollowUp, FollowUp)> {
        let existing = self.get(caller, id).await?;

        if matches!(patch.title.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(ServiceError::field("title", "Title is required"));
        }
        if let Some(assigned) = patch.assigned_user_id {
            if assigned != existing.assigned_user_id && !caller.is_privileged() {
                return Err(ServiceError::forbidden());
            }
        }

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE follow_ups SET updated_at = NOW()");
        if let Some(title) = patch.title {
            query.push(", title = ").push_bind(title.trim().to_string());
        }
        if let Some(description) = patch.description {
            query
                .push(", description = ")
                .push_bind(non_blank(description.as_deref()));
        }
        if let Some(notes) = patch.notes {
            query.push(", notes = ").push_bind(non_blank(notes.as_deref()));
        }
        if let Some(date) = patch.scheduled_date {
            query.push(", scheduled_date = ").push_bind(date);
            if date != existing.scheduled_date {
                query.push(", last_escalation_level = 0");
            }
        }
        if let Some(assigned) = patch.assigned_user_id {
            query.push(", assigned_user_id = ").push_bind(assigned);
        }
        match patch.completed {
            Some(true) => {
                query.push(", completed = TRUE, completed_at = NOW()");
            }
            Some(false) => {
                query.push(", completed = FALSE, completed_at = NULL");
            }
            None => {}
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", FOLLOW_UP_COLUMNS));

        let updated = query.build_query_as::<FollowUp>().fetch_one(&self.pool).await?;
        Ok((existing, updated))
    }

    pub async fn delete(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<FollowUp> {
        let follow_up = self.get(caller, id).await?;
        sqlx::query("DELETE FROM follow_ups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(follow_up)
    }

    /// Incomplete follow-ups scheduled during the current UTC day
    pub async fn today(&self, caller: &AuthUser, now: DateTime<Utc>) -> ServiceResult<Vec<FollowUp>> {
        let (start, end) = day_bounds(now);
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM follow_ups WHERE completed = FALSE",
            FOLLOW_UP_COLUMNS
        ));
        query.push(" AND scheduled_date >= ").push_bind(start);
        query.push(" AND scheduled_date < ").push_bind(end);
        if let Some(owner) = caller.owner_scope() {
            query.push(" AND assigned_user_id = ").push_bind(owner);
        }
        query.push(" ORDER BY scheduled_date ASC");
        Ok(query.build_query_as::<FollowUp>().fetch_all(&self.pool).await?)
    }

    /// Overdue follow-ups visible to `caller`
    pub async fn overdue_for(&self, caller: &AuthUser, now: DateTime<Utc>) -> ServiceResult<Vec<FollowUp>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM follow_ups WHERE completed = FALSE",
            FOLLOW_UP_COLUMNS
        ));
        query.push(" AND scheduled_date < ").push_bind(now);
        if let Some(owner) = caller.owner_scope() {
            query.push(" AND assigned_user_id = ").push_bind(owner);
        }
        query.push(" ORDER BY scheduled_date ASC");
        Ok(query.build_query_as::<FollowUp>().fetch_all(&self.pool).await?)
    }
}
