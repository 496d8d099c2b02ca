use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::auth::JwtError;
use crate::database::manager::DatabaseError;

/// Errors shared by the domain services
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account is locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Token(#[from] JwtError),

    #[error(transparent)]
    Password(#[from] bcrypt::BcryptError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            message: message.into(),
            field_errors: None,
        }
    }

    /// Single-field validation failure
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.clone());
        ServiceError::Validation {
            message,
            field_errors: Some(field_errors),
        }
    }

    pub fn not_found(what: &str) -> Self {
        ServiceError::NotFound(format!("{} not found", what))
    }

    pub fn forbidden() -> Self {
        ServiceError::Forbidden("Forbidden: Insufficient permissions".to_string())
    }
}

/// Collects per-field validation failures before returning them together.
#[derive(Debug, Default)]
pub struct FieldErrors(HashMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, field: &str, value: Option<&str>, message: &str) {
        if value.map(|v| v.trim().is_empty()).unwrap_or(true) {
            self.0.insert(field.to_string(), message.to_string());
        }
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.insert(field.to_string(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> ServiceResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation {
                message: "Validation failed".to_string(),
                field_errors: Some(self.0),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_blank_values() {
        let mut errors = FieldErrors::new();
        errors.require("title", Some("  "), "Title is required");
        errors.require("company", None, "Company is required");
        errors.require("location", Some("Remote"), "Location is required");

        match errors.into_result() {
            Err(ServiceError::Validation { field_errors: Some(fields), .. }) => {
                assert_eq!(fields.len(), 2);
                assert!(fields.contains_key("title"));
                assert!(fields.contains_key("company"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }
}
