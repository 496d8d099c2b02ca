//! Automation rules: storage, condition matching and action execution.

pub mod actions;
pub mod conditions;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::models::application::APPLICATION_COLUMNS;
use crate::database::models::client::CLIENT_COLUMNS;
use crate::database::models::follow_up::FOLLOW_UP_COLUMNS;
use crate::database::models::lead::LEAD_COLUMNS;
use crate::database::models::rule::RULE_COLUMNS;
use crate::database::models::{
    Application, AutomationRule, Client, FollowUp, Lead, RuleAction, RuleCondition, RuleEntity,
};
use crate::services::double_option;
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use crate::services::non_blank;

pub use actions::{ActionExecutor, RuleTarget};

const MAX_NAME_LENGTH: usize = 255;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleInput {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub entity: RuleEntity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleInput {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub entity: Option<RuleEntity>,
    pub enabled: Option<bool>,
    pub priority: Option<i32>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<Vec<RuleAction>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleFilter {
    pub entity: Option<RuleEntity>,
    pub enabled: Option<bool>,
}

/// Outcome of a sweep over one entity type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    pub entity: RuleEntity,
    pub entities_checked: usize,
    pub rules_executed: usize,
}

fn check_name(errors: &mut FieldErrors, name: &str) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        errors.add("name", "Name is required");
    } else if trimmed.chars().count() > MAX_NAME_LENGTH {
        errors.add("name", "Name must be at most 255 characters");
    }
}

fn check_priority(errors: &mut FieldErrors, priority: i32) {
    if priority < 0 {
        errors.add("priority", "Priority must be zero or greater");
    }
}

impl CreateRuleInput {
    pub fn validate(&self) -> ServiceResult<()> {
        let mut errors = FieldErrors::new();
        check_name(&mut errors, &self.name);
        check_priority(&mut errors, self.priority);
        if self.conditions.is_empty() {
            errors.add("conditions", "At least one condition is required");
        }
        if self.actions.is_empty() {
            errors.add("actions", "At least one action is required");
        }
        errors.into_result()
    }
}

impl UpdateRuleInput {
    pub fn validate(&self) -> ServiceResult<()> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            check_name(&mut errors, name);
        }
        if let Some(priority) = self.priority {
            check_priority(&mut errors, priority);
        }
        errors.into_result()
    }
}

pub struct RuleService {
    pool: PgPool,
}

impl RuleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Highest priority first, then newest
    pub async fn list(&self, filter: &RuleFilter) -> ServiceResult<Vec<AutomationRule>> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM automation_rules WHERE 1=1", RULE_COLUMNS));
        if let Some(entity) = filter.entity {
            query.push(" AND entity = ").push_bind(entity);
        }
        if let Some(enabled) = filter.enabled {
            query.push(" AND enabled = ").push_bind(enabled);
        }
        query.push(" ORDER BY priority DESC, created_at DESC");
        Ok(query.build_query_as::<AutomationRule>().fetch_all(&self.pool).await?)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<AutomationRule> {
        sqlx::query_as::<_, AutomationRule>(&format!(
            "SELECT {} FROM automation_rules WHERE id = $1",
            RULE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("Rule"))
    }

    pub async fn create(&self, created_by: Uuid, input: CreateRuleInput) -> ServiceResult<AutomationRule> {
        input.validate()?;

        let rule = sqlx::query_as::<_, AutomationRule>(&format!(
            "INSERT INTO automation_rules (name, description, entity, conditions, actions, enabled, priority, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            RULE_COLUMNS
        ))
        .bind(input.name.trim())
        .bind(non_blank(input.description.as_deref()))
        .bind(input.entity)
        .bind(Json(&input.conditions))
        .bind(Json(&input.actions))
        .bind(input.enabled)
        .bind(input.priority)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(rule_id = %rule.id, entity = rule.entity.as_str(), "automation rule created");
        Ok(rule)
    }

    /// Returns the rule before and after the change
    pub async fn update(&self, id: Uuid, patch: UpdateRuleInput) -> ServiceResult<(AutomationRule, AutomationRule)> {
        patch.validate()?;
        let existing = self.get(id).await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE automation_rules SET updated_at = NOW()");
        if let Some(name) = patch.name {
            query.push(", name = ").push_bind(name.trim().to_string());
        }
        if let Some(description) = patch.description {
            query.push(", description = ").push_bind(non_blank(description.as_deref()));
        }
        if let Some(entity) = patch.entity {
            query.push(", entity = ").push_bind(entity);
        }
        if let Some(enabled) = patch.enabled {
            query.push(", enabled = ").push_bind(enabled);
        }
        if let Some(priority) = patch.priority {
            query.push(", priority = ").push_bind(priority);
        }
        if let Some(conditions) = patch.conditions {
            query.push(", conditions = ").push_bind(Json(conditions));
        }
        if let Some(actions) = patch.actions {
            query.push(", actions = ").push_bind(Json(actions));
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", RULE_COLUMNS));

        let updated = query.build_query_as::<AutomationRule>().fetch_one(&self.pool).await?;
        Ok((existing, updated))
    }

    pub async fn toggle(&self, id: Uuid, enabled: bool) -> ServiceResult<(AutomationRule, AutomationRule)> {
        self.update(
            id,
            UpdateRuleInput {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete(&self, id: Uuid) -> ServiceResult<AutomationRule> {
        let rule = self.get(id).await?;
        sqlx::query("DELETE FROM automation_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(rule)
    }

    /// Runs the enabled rules for one entity; returns how many fired
    pub async fn evaluate_for_entity(
        &self,
        entity: RuleEntity,
        entity_id: Uuid,
        data: &Value,
        now: DateTime<Utc>,
    ) -> ServiceResult<usize> {
        let rules = self
            .list(&RuleFilter {
                entity: Some(entity),
                enabled: Some(true),
            })
            .await?;
        Ok(self.run_rules(&rules, entity, entity_id, data, now).await)
    }

    async fn run_rules(
        &self,
        rules: &[AutomationRule],
        entity: RuleEntity,
        entity_id: Uuid,
        data: &Value,
        now: DateTime<Utc>,
    ) -> usize {
        let executor = ActionExecutor::new(self.pool.clone());
        let target = RuleTarget {
            entity,
            id: entity_id,
            data,
        };

        let mut executed = 0;
        for rule in rules {
            if !conditions::evaluate_all(&rule.conditions, data, now) {
                continue;
            }
            match self.fire(&executor, rule, target).await {
                Ok(()) => executed += 1,
                Err(e) => {
                    tracing::error!(rule_id = %rule.id, entity_id = %entity_id, "Error evaluating rule: {}", e);
                }
            }
        }
        executed
    }

    async fn fire(&self, executor: &ActionExecutor, rule: &AutomationRule, target: RuleTarget<'_>) -> ServiceResult<()> {
        executor.execute_all(&rule.actions, target).await?;
        sqlx::query(
            "UPDATE automation_rules SET run_count = run_count + 1, last_run_at = NOW() WHERE id = $1",
        )
        .bind(rule.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Evaluates every open entity of one type
    pub async fn evaluate_entity_type(&self, entity: RuleEntity, now: DateTime<Utc>) -> ServiceResult<SweepResult> {
        let rules = self
            .list(&RuleFilter {
                entity: Some(entity),
                enabled: Some(true),
            })
            .await?;

        let targets = if rules.is_empty() {
            Vec::new()
        } else {
            self.open_entities(entity).await?
        };

        let mut rules_executed = 0;
        for (id, data) in &targets {
            rules_executed += self.run_rules(&rules, entity, *id, data, now).await;
        }

        tracing::info!(
            entity = entity.as_str(),
            checked = targets.len(),
            executed = rules_executed,
            "rule sweep finished"
        );
        Ok(SweepResult {
            entity,
            entities_checked: targets.len(),
            rules_executed,
        })
    }

    /// Sweeps every entity type in turn
    pub async fn evaluate_all(&self, now: DateTime<Utc>) -> ServiceResult<Vec<SweepResult>> {
        let mut results = Vec::with_capacity(RuleEntity::ALL.len());
        for entity in RuleEntity::ALL {
            results.push(self.evaluate_entity_type(entity, now).await?);
        }
        Ok(results)
    }

    async fn open_entities(&self, entity: RuleEntity) -> ServiceResult<Vec<(Uuid, Value)>> {
        let rows = match entity {
            RuleEntity::Lead => to_values(
                sqlx::query_as::<_, Lead>(&format!(
                    "SELECT {} FROM leads WHERE status <> 'LOST'",
                    LEAD_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?,
                |l| l.id,
            )?,
            RuleEntity::Client => to_values(
                sqlx::query_as::<_, Client>(&format!(
                    "SELECT {} FROM clients WHERE status = 'ACTIVE'",
                    CLIENT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?,
                |c| c.id,
            )?,
            RuleEntity::FollowUp => to_values(
                sqlx::query_as::<_, FollowUp>(&format!(
                    "SELECT {} FROM follow_ups WHERE completed = FALSE",
                    FOLLOW_UP_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?,
                |f| f.id,
            )?,
            RuleEntity::Application => to_values(
                sqlx::query_as::<_, Application>(&format!(
                    "SELECT {} FROM applications WHERE stage <> 'CLOSED'",
                    APPLICATION_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?,
                |a| a.id,
            )?,
            // No backing tables
            RuleEntity::Revenue | RuleEntity::Payment => Vec::new(),
        };
        Ok(rows)
    }
}

fn to_values<T: Serialize>(rows: Vec<T>, id: impl Fn(&T) -> Uuid) -> ServiceResult<Vec<(Uuid, Value)>> {
    rows.into_iter()
        .map(|row| -> ServiceResult<(Uuid, Value)> { Ok((id(&row), serde_json::to_value(&row)?)) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_requires_conditions_and_actions() {
        let input: CreateRuleInput = serde_json::from_value(json!({
            "name": "Stale leads",
            "entity": "LEAD",
            "priority": -1
        }))
        .unwrap();
        assert!(input.enabled);

        match input.validate() {
            Err(ServiceError::Validation { field_errors: Some(fields), .. }) => {
                assert!(fields.contains_key("conditions"));
                assert!(fields.contains_key("actions"));
                assert!(fields.contains_key("priority"));
                assert!(!fields.contains_key("name"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn create_accepts_a_complete_rule() {
        let input: CreateRuleInput = serde_json::from_value(json!({
            "name": "Stale leads",
            "entity": "LEAD",
            "conditions": [{"field": "daysSinceCreatedAt", "operator": "GREATER_THAN", "value": 14}],
            "actions": [{"type": "NOTIFY_MANAGER", "message": "Lead is going stale"}]
        }))
        .unwrap();
        assert!(input.validate().is_ok());
        assert_eq!(input.priority, 0);
    }

    #[test]
    fn long_names_are_rejected() {
        let patch = UpdateRuleInput {
            name: Some("x".repeat(256)),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
        assert!(UpdateRuleInput::default().validate().is_ok());
    }
}
