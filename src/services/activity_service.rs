use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::models::activity::{Activity, ActivityType, ACTIVITY_COLUMNS};
use crate::middleware::AuthUser;
use crate::services::double_option;
use crate::services::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewActivity {
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    pub assigned_user_id: Uuid,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Request body for logging an activity; the assignee defaults to the caller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateActivityInput {
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_user_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateActivityInput {
    #[serde(rename = "type")]
    pub activity_type: Option<ActivityType>,
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub assigned_user_id: Option<Uuid>,
}

pub struct ActivityService {
    pool: PgPool,
}

impl ActivityService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: NewActivity) -> ServiceResult<Activity> {
        if input.title.trim().is_empty() {
            return Err(ServiceError::field("title", "Title is required"));
        }

        let activity = sqlx::query_as::<_, Activity>(&format!(
            "INSERT INTO activities (lead_id, client_id, assigned_user_id, activity_type, title, description, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, NOW())) RETURNING {}",
            ACTIVITY_COLUMNS
        ))
        .bind(input.lead_id)
        .bind(input.client_id)
        .bind(input.assigned_user_id)
        .bind(input.activity_type)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(input.occurred_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(activity)
    }

    pub async fn log(&self, caller: &AuthUser, input: CreateActivityInput) -> ServiceResult<Activity> {
        let assigned = input.assigned_user_id.unwrap_or(caller.user_id);
        if assigned != caller.user_id && !caller.is_privileged() {
            return Err(ServiceError::forbidden());
        }
        self.create(NewActivity {
            lead_id: input.lead_id,
            client_id: input.client_id,
            assigned_user_id: assigned,
            activity_type: input.activity_type,
            title: input.title,
            description: input.description,
            occurred_at: input.occurred_at,
        })
        .await
    }

    pub async fn find(&self, id: Uuid) -> ServiceResult<Activity> {
        sqlx::query_as::<_, Activity>(&format!("SELECT {} FROM activities WHERE id = $1", ACTIVITY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Activity"))
    }

    pub async fn get(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Activity> {
        let activity = self.find(id).await?;
        caller.ensure_access(activity.assigned_user_id)?;
        Ok(activity)
    }

    pub async fn update(
        &self,
        caller: &AuthUser,
        id: Uuid,
        patch: UpdateActivityInput,
    ) -> ServiceResult<(Activity, Activity)> {
        let existing = self.get(caller, id).await?;
        if matches!(patch.title.as_deref(), Some(t) if t.trim().is_empty()) {
            return Err(ServiceError::field("title", "Title is required"));
        }

        // activities carry no updated_at, so the SET list starts with a no-op
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE activities SET id = id");
        if let Some(kind) = patch.activity_type {
            query.push(", activity_type = ").push_bind(kind);
        }
        if let Some(title) = patch.title {
            query.push(", title = ").push_bind(title.trim().to_string());
        }
        if let Some(description) = patch.description {
            query.push(", description = ").push_bind(description);
        }
        if let Some(occurred_at) = patch.occurred_at {
            query.push(", occurred_at = ").push_bind(occurred_at);
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", ACTIVITY_COLUMNS));

        let updated = query.build_query_as::<Activity>().fetch_one(&self.pool).await?;
        Ok((existing, updated))
    }

    pub async fn delete(&self, caller: &AuthUser, id: Uuid) -> ServiceResult<Activity> {
        let activity = self.get(caller, id).await?;
        sqlx::query("DELETE FROM activities WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(activity)
    }

    /// Newest first; `owner` restricts to one assignee
    pub async fn list(&self, filter: &ActivityFilter, owner: Option<Uuid>) -> ServiceResult<Vec<Activity>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM activities WHERE 1=1", ACTIVITY_COLUMNS));

        if let Some(owner) = owner.or(filter.assigned_user_id) {
            query.push(" AND assigned_user_id = ").push_bind(owner);
        }
        if let Some(lead_id) = filter.lead_id {
            query.push(" AND lead_id = ").push_bind(lead_id);
        }
        if let Some(client_id) = filter.client_id {
            query.push(" AND client_id = ").push_bind(client_id);
        }
        query.push(" ORDER BY occurred_at DESC LIMIT 200");

        Ok(query.build_query_as::<Activity>().fetch_all(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_body_uses_type_key_and_optional_assignee() {
        let input: CreateActivityInput = serde_json::from_value(json!({
            "type": "CALL",
            "title": "Intro call",
            "leadId": "6f1c2b1e-3c1a-4b8e-9d55-0a4de3f1c001"
        }))
        .unwrap();
        assert_eq!(input.activity_type, ActivityType::Call);
        assert!(input.assigned_user_id.is_none());
        assert!(input.lead_id.is_some());
    }

    #[test]
    fn update_distinguishes_cleared_description() {
        let patch: UpdateActivityInput =
            serde_json::from_value(json!({"description": null, "type": "NOTE"})).unwrap();
        assert_eq!(patch.description, Some(None));
        assert_eq!(patch.activity_type, Some(ActivityType::Note));

        let patch: UpdateActivityInput = serde_json::from_value(json!({"title": "x"})).unwrap();
        assert!(patch.description.is_none());
    }
}
