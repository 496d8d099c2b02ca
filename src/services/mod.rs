pub mod activity_service;
pub mod analytics_service;
pub mod application_service;
pub mod audit_service;
pub mod auth_service;
pub mod client_service;
pub mod error;
pub mod follow_up_service;
pub mod job_service;
pub mod lead_document_service;
pub mod lead_service;
pub mod notification_service;
pub mod onboarding_service;
pub mod rules;
pub mod system_health_service;
pub mod users_service;

use serde::{Deserialize, Deserializer};

pub use error::{ServiceError, ServiceResult};

/// Distinguishes an explicit `null` (`Some(None)`) from an absent key (`None`)
/// in partial-update payloads. Pair with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

/// Trim an optional string, treating blank as absent
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("a.b@example.co"));
        assert!(!is_valid_email("no-at.example.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@@b.com"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn blank_strings_become_none() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" x ")), Some("x".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
