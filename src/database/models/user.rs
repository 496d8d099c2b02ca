use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Manager,
    Recruiter,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Manager => "MANAGER",
            UserRole::Recruiter => "RECRUITER",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub manager_id: Option<Uuid>,
    pub last_login: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map(|until| until > now).unwrap_or(false)
    }
}

/// Compact user reference embedded in other records
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// User row for the admin listing, with manager and ownership counts
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserListItem {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub manager_id: Option<Uuid>,
    pub manager_first_name: Option<String>,
    pub manager_last_name: Option<String>,
    pub manager_email: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub jobs_count: i64,
    pub clients_count: i64,
    pub applications_count: i64,
    pub created_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, role, is_active, \
     manager_id, last_login, failed_login_attempts, locked_until, created_at, updated_at";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(locked_until: Option<DateTime<Utc>>) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: UserRole::Recruiter,
            is_active: true,
            manager_id: None,
            last_login: None,
            failed_login_attempts: 0,
            locked_until,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lock_expires() {
        let now = Utc::now();
        assert!(user(Some(now + Duration::minutes(5))).is_locked(now));
        assert!(!user(Some(now - Duration::minutes(5))).is_locked(now));
        assert!(!user(None).is_locked(now));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let value = serde_json::to_value(user(None)).unwrap();
        assert!(value.get("passwordHash").is_none());
        assert_eq!(value["firstName"], "Ada");
        assert_eq!(value["role"], "RECRUITER");
    }
}
