use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rule_entity", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleEntity {
    Lead,
    Client,
    FollowUp,
    Application,
    Revenue,
    Payment,
}

impl RuleEntity {
    pub const ALL: [RuleEntity; 6] = [
        RuleEntity::Lead,
        RuleEntity::Client,
        RuleEntity::FollowUp,
        RuleEntity::Application,
        RuleEntity::Revenue,
        RuleEntity::Payment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleEntity::Lead => "LEAD",
            RuleEntity::Client => "CLIENT",
            RuleEntity::FollowUp => "FOLLOW_UP",
            RuleEntity::Application => "APPLICATION",
            RuleEntity::Revenue => "REVENUE",
            RuleEntity::Payment => "PAYMENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
    NotContains,
    IsNull,
    IsNotNull,
    DaysSince,
    DaysUntil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    NotifyEmployee,
    NotifyManager,
    NotifyAdmin,
    Escalate,
    CreateActivity,
    UpdateStatus,
    CreateFollowUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    /// Dotted path into the entity, or a computed `daysSince<Field>` name
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub entity: RuleEntity,
    pub conditions: Json<Vec<RuleCondition>>,
    pub actions: Json<Vec<RuleAction>>,
    pub enabled: bool,
    pub priority: i32,
    pub run_count: i32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const RULE_COLUMNS: &str = "id, name, description, entity, conditions, actions, enabled, priority, \
     run_count, last_run_at, created_by, created_at, updated_at";
