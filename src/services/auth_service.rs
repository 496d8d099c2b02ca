use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{self, Claims};
use crate::config;
use crate::database::models::user::{User, UserRole, USER_COLUMNS};
use crate::services::error::{FieldErrors, ServiceError, ServiceResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

impl From<&User> for LoginUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub user: LoginUser,
}

/// Counter state to persist after a failed password check
#[derive(Debug, PartialEq, Eq)]
pub struct FailedLogin {
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

/// `attempts` already includes the failure being recorded. Reaching
/// `max_attempts` locks the account and restarts the counter.
pub fn register_failure(
    attempts: i32,
    max_attempts: i32,
    lockout_minutes: i64,
    now: DateTime<Utc>,
) -> FailedLogin {
    if attempts >= max_attempts {
        FailedLogin {
            attempts: 0,
            locked_until: Some(now + Duration::minutes(lockout_minutes)),
        }
    } else {
        FailedLogin {
            attempts,
            locked_until: None,
        }
    }
}

pub struct AuthService {
    pool: PgPool,
}

impl AuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn login(&self, request: &LoginRequest, now: DateTime<Utc>) -> ServiceResult<LoginResult> {
        let email = request.email.trim().to_lowercase();

        let mut errors = FieldErrors::new();
        errors.require("email", Some(&email), "Email is required");
        if !email.is_empty() && !email.contains('@') {
            errors.add("email", "Invalid email address");
        }
        errors.require("password", Some(&request.password), "Password is required");
        errors.into_result()?;

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = $1",
            USER_COLUMNS
        ))
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServiceError::InvalidCredentials)?;

        if !user.is_active {
            tracing::warn!(user_id = %user.id, "login attempt on inactive account");
            return Err(ServiceError::AccountInactive);
        }

        if let Some(until) = user.locked_until.filter(|until| *until > now) {
            tracing::warn!(user_id = %user.id, "login attempt on locked account");
            return Err(ServiceError::AccountLocked { until });
        }

        if !auth::verify_password(&request.password, &user.password_hash) {
            self.record_failure(&user, now).await?;
            return Err(ServiceError::InvalidCredentials);
        }

        sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, locked_until = NULL, last_login = $2, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(user.id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let token = auth::generate_token(&Claims::new(user.id, user.email.clone(), user.role))?;
        tracing::info!(user_id = %user.id, "user logged in");

        Ok(LoginResult {
            token,
            user: LoginUser::from(&user),
        })
    }

    async fn record_failure(&self, user: &User, now: DateTime<Utc>) -> ServiceResult<()> {
        let security = &config::config().security;

        // Counted in the database so concurrent failures are never lost.
        // An expired lock starts a fresh window.
        let (attempts,): (i32,) = sqlx::query_as(
            "UPDATE users SET \
             failed_login_attempts = CASE WHEN locked_until IS NOT NULL AND locked_until <= $2 \
                 THEN 1 ELSE failed_login_attempts + 1 END, \
             locked_until = CASE WHEN locked_until <= $2 THEN NULL ELSE locked_until END, \
             updated_at = NOW() \
             WHERE id = $1 RETURNING failed_login_attempts",
        )
        .bind(user.id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let state = register_failure(attempts, security.max_failed_logins, security.lockout_minutes, now);
        let Some(locked_until) = state.locked_until else {
            tracing::warn!(user_id = %user.id, attempts, "failed login");
            return Ok(());
        };

        let locked = sqlx::query(
            "UPDATE users SET failed_login_attempts = 0, locked_until = $2, updated_at = NOW() \
             WHERE id = $1 AND failed_login_attempts >= $3",
        )
        .bind(user.id)
        .bind(locked_until)
        .bind(security.max_failed_logins)
        .execute(&self.pool)
        .await?;
        if locked.rows_affected() > 0 {
            tracing::warn!(user_id = %user.id, "account locked after repeated failed logins");
        }
        Ok(())
    }

    pub async fn current_user(&self, user_id: Uuid) -> ServiceResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("User"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_below_threshold_only_count() {
        let now = Utc::now();
        let state = register_failure(3, 5, 15, now);
        assert_eq!(state, FailedLogin { attempts: 3, locked_until: None });
    }

    #[test]
    fn fifth_failure_locks_for_configured_minutes() {
        let now = Utc::now();
        let state = register_failure(5, 5, 15, now);
        assert_eq!(state.attempts, 0);
        assert_eq!(state.locked_until, Some(now + Duration::minutes(15)));
    }

    #[test]
    fn failures_past_threshold_still_lock() {
        let now = Utc::now();
        let state = register_failure(7, 5, 30, now);
        assert_eq!(state.locked_until, Some(now + Duration::minutes(30)));
    }
}
