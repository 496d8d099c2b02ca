use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::auth::{self, password::MIN_PASSWORD_LENGTH};
use crate::database::models::user::{User, UserListItem, UserRole, USER_COLUMNS};
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};
use crate::services::{double_option, is_valid_email};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "default_role")]
    pub role: UserRole,
    #[serde(default)]
    pub manager_id: Option<Uuid>,
}

fn default_role() -> UserRole {
    UserRole::Recruiter
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserInput {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub manager_id: Option<Option<Uuid>>,
    pub password: Option<String>,
}

pub struct UsersService {
    pool: PgPool,
}

impl UsersService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, role: Option<UserRole>) -> ServiceResult<Vec<UserListItem>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT u.id, u.email, u.first_name, u.last_name, u.role, u.is_active, u.manager_id, \
             m.first_name AS manager_first_name, m.last_name AS manager_last_name, \
             m.email AS manager_email, u.last_login, u.failed_login_attempts, u.locked_until, \
             (SELECT COUNT(*) FROM jobs j WHERE j.recruiter_id = u.id) AS jobs_count, \
             (SELECT COUNT(*) FROM clients c WHERE c.assigned_user_id = u.id) AS clients_count, \
             (SELECT COUNT(*) FROM applications a WHERE a.recruiter_id = u.id) AS applications_count, \
             u.created_at \
             FROM users u LEFT JOIN users m ON m.id = u.manager_id WHERE 1=1",
        );
        if let Some(role) = role {
            query.push(" AND u.role = ").push_bind(role);
        }
        query.push(" ORDER BY u.created_at DESC");

        Ok(query.build_query_as::<UserListItem>().fetch_all(&self.pool).await?)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))
    }

    /// Every active user holding `role`
    pub async fn ids_with_role(&self, role: UserRole) -> ServiceResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE role = $1 AND is_active = TRUE")
                .bind(role)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn list_by_role(&self, role: UserRole) -> ServiceResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE role = $1 AND is_active = TRUE ORDER BY first_name, last_name",
            USER_COLUMNS
        ))
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create(&self, input: CreateUserInput) -> ServiceResult<User> {
        let email = input.email.trim().to_lowercase();

        let mut errors = FieldErrors::new();
        errors.require("email", Some(&email), "Email is required");
        if !email.is_empty() && !is_valid_email(&email) {
            errors.add("email", "Invalid email address");
        }
        if input.password.chars().count() < MIN_PASSWORD_LENGTH {
            errors.add("password", "Password must be at least 8 characters");
        }
        errors.require("firstName", Some(&input.first_name), "First name is required");
        errors.require("lastName", Some(&input.last_name), "Last name is required");
        errors.into_result()?;

        if self.email_taken(&email, None).await? {
            return Err(ServiceError::Conflict("User with this email already exists".to_string()));
        }
        if let Some(manager_id) = input.manager_id {
            self.ensure_manager(manager_id).await?;
        }

        let password_hash = auth::hash_password(&input.password)?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, first_name, last_name, role, manager_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&email)
        .bind(&password_hash)
        .bind(input.first_name.trim())
        .bind(input.last_name.trim())
        .bind(input.role)
        .bind(input.manager_id)
        .fetch_one(&self.pool)
        .await
        .map_err(email_conflict)?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "user created");
        Ok(user)
    }

    pub async fn update(&self, id: Uuid, patch: UpdateUserInput) -> ServiceResult<User> {
        let existing = self.get(id).await?;

        let mut errors = FieldErrors::new();
        let email = patch.email.as_ref().map(|e| e.trim().to_lowercase());
        if let Some(email) = &email {
            if !is_valid_email(email) {
                errors.add("email", "Invalid email address");
            }
        }
        if let Some(first) = &patch.first_name {
            errors.require("firstName", Some(first), "First name is required");
        }
        if let Some(last) = &patch.last_name {
            errors.require("lastName", Some(last), "Last name is required");
        }
        if let Some(password) = &patch.password {
            if password.chars().count() < MIN_PASSWORD_LENGTH {
                errors.add("password", "Password must be at least 8 characters");
            }
        }
        if let Some(Some(manager_id)) = patch.manager_id {
            if manager_id == id {
                errors.add("managerId", "A user cannot be their own manager");
            }
        }
        errors.into_result()?;

        if let Some(email) = &email {
            if *email != existing.email && self.email_taken(email, Some(id)).await? {
                return Err(ServiceError::Conflict("User with this email already exists".to_string()));
            }
        }
        if let Some(Some(manager_id)) = patch.manager_id {
            self.ensure_manager(manager_id).await?;
        }

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = NOW()");
        if let Some(email) = email {
            query.push(", email = ").push_bind(email);
        }
        if let Some(first) = patch.first_name {
            query.push(", first_name = ").push_bind(first.trim().to_string());
        }
        if let Some(last) = patch.last_name {
            query.push(", last_name = ").push_bind(last.trim().to_string());
        }
        if let Some(role) = patch.role {
            query.push(", role = ").push_bind(role);
        }
        if let Some(is_active) = patch.is_active {
            query.push(", is_active = ").push_bind(is_active);
        }
        if let Some(manager_id) = patch.manager_id {
            query.push(", manager_id = ").push_bind(manager_id);
        }
        if let Some(password) = patch.password {
            query.push(", password_hash = ").push_bind(auth::hash_password(&password)?);
        }
        query
            .push(" WHERE id = ")
            .push_bind(id)
            .push(format!(" RETURNING {}", USER_COLUMNS));

        query
            .build_query_as::<User>()
            .fetch_one(&self.pool)
            .await
            .map_err(email_conflict)
    }

    pub async fn delete(&self, id: Uuid, acting_user: Uuid) -> ServiceResult<User> {
        if id == acting_user {
            return Err(ServiceError::BadRequest("You cannot delete your own account".to_string()));
        }
        let user = self.get(id).await?;
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::info!(user_id = %id, "user deleted");
        Ok(user)
    }

    pub async fn unlock(&self, id: Uuid) -> ServiceResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("User"))
    }

    /// Enforces the strength policy and clears any lockout
    pub async fn reset_password(&self, id: Uuid, new_password: &str) -> ServiceResult<User> {
        let problems = auth::validate_password_strength(new_password);
        if !problems.is_empty() {
            return Err(ServiceError::field("newPassword", problems.join(", ")));
        }
        let password_hash = auth::hash_password(new_password)?;

        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET password_hash = $2, failed_login_attempts = 0, locked_until = NULL, \
             updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&password_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::not_found("User"))
    }

    async fn email_taken(&self, email: &str, except: Option<Uuid>) -> ServiceResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE LOWER(email) = $1 AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(email)
        .bind(except)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn ensure_manager(&self, manager_id: Uuid) -> ServiceResult<()> {
        let manager = match self.get(manager_id).await {
            Ok(manager) => manager,
            Err(ServiceError::NotFound(_)) => {
                return Err(ServiceError::field("managerId", "Manager not found"))
            }
            Err(e) => return Err(e),
        };
        if !matches!(manager.role, UserRole::Manager | UserRole::Admin) {
            return Err(ServiceError::field("managerId", "Assigned manager must be a MANAGER or ADMIN"));
        }
        Ok(())
    }
}

/// Two creates can both pass `email_taken`; the unique index decides
fn email_conflict(e: sqlx::Error) -> ServiceError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ServiceError::Conflict("User with this email already exists".to_string())
        }
        e => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::borrow::Cow;

    #[derive(Debug)]
    struct DuplicateEmail;

    impl std::fmt::Display for DuplicateEmail {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint \"users_email_key\"")
        }
    }

    impl std::error::Error for DuplicateEmail {}

    impl sqlx::error::DatabaseError for DuplicateEmail {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint \"users_email_key\""
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("23505"))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_on_email_is_a_conflict() {
        let err = email_conflict(sqlx::Error::Database(Box::new(DuplicateEmail)));
        assert!(matches!(err, ServiceError::Conflict(msg) if msg.contains("already exists")));

        let err = email_conflict(sqlx::Error::RowNotFound);
        assert!(matches!(err, ServiceError::Sqlx(_)));
    }

    #[test]
    fn manager_id_distinguishes_null_from_missing() {
        let cleared: UpdateUserInput = serde_json::from_value(json!({"managerId": null})).unwrap();
        assert_eq!(cleared.manager_id, Some(None));

        let untouched: UpdateUserInput = serde_json::from_value(json!({"firstName": "Ann"})).unwrap();
        assert_eq!(untouched.manager_id, None);
    }

    #[test]
    fn create_input_defaults_to_recruiter() {
        let input: CreateUserInput = serde_json::from_value(json!({
            "email": "new@example.com",
            "password": "password1",
            "firstName": "New",
            "lastName": "User"
        }))
        .unwrap();
        assert_eq!(input.role, UserRole::Recruiter);
    }
}
