//! Rule condition evaluation over an entity's camelCase JSON.
//!
//! Comparisons follow loose scripting semantics: numeric operators coerce
//! both sides to numbers, `CONTAINS` compares case-insensitive string forms,
//! and equality is strict (no cross-type coercion).

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::database::models::rule::{ConditionOperator, RuleCondition};

const MILLIS_PER_DAY: i64 = 1000 * 60 * 60 * 24;

/// Every condition must hold; an empty list matches
pub fn evaluate_all(conditions: &[RuleCondition], entity: &Value, now: DateTime<Utc>) -> bool {
    conditions.iter().all(|c| evaluate(c, entity, now))
}

pub fn evaluate(condition: &RuleCondition, entity: &Value, now: DateTime<Utc>) -> bool {
    let field = condition.field.as_str();
    if field.starts_with("daysSince") || field.starts_with("daysUntil") {
        return evaluate_days(condition, entity, now);
    }

    let actual = lookup(entity, field);
    let expected = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => actual.map(|a| strict_eq(a, expected)).unwrap_or(false),
        ConditionOperator::NotEquals => !actual.map(|a| strict_eq(a, expected)).unwrap_or(false),
        ConditionOperator::GreaterThan => compare(actual, expected, |a, b| a > b),
        ConditionOperator::LessThan => compare(actual, expected, |a, b| a < b),
        ConditionOperator::GreaterThanOrEqual => compare(actual, expected, |a, b| a >= b),
        ConditionOperator::LessThanOrEqual => compare(actual, expected, |a, b| a <= b),
        ConditionOperator::Contains => contains(actual, expected),
        ConditionOperator::NotContains => !contains(actual, expected),
        ConditionOperator::IsNull => actual.map(Value::is_null).unwrap_or(true),
        ConditionOperator::IsNotNull => actual.map(|v| !v.is_null()).unwrap_or(false),
        // Only meaningful on computed day fields
        ConditionOperator::DaysSince | ConditionOperator::DaysUntil => false,
    }
}

/// Resolve a dotted path such as `assignedUser.email`
pub fn lookup<'a>(entity: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(entity, |current, part| current.as_object()?.get(part))
}

fn strict_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(_), _) | (Value::Object(_), _) => false,
        (a, b) => a == b,
    }
}

/// Numeric coercion; `None` stands in for NaN
pub fn to_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().ok()?
            }
        }
        Value::Array(items) => match items.as_slice() {
            [] => 0.0,
            [single] => to_number(Some(single))?,
            _ => return None,
        },
        Value::Object(_) => return None,
    };
    (!n.is_nan()).then_some(n)
}

fn compare(actual: Option<&Value>, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (to_number(actual), to_number(Some(expected))) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0 || f.is_nan()).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// String form used by substring checks; falsy values become ""
pub fn to_text(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(v) if is_falsy(v) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| if item.is_null() { String::new() } else { to_text(Some(item)) })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
        Some(Value::Null) => String::new(),
    }
}

fn contains(actual: Option<&Value>, expected: &Value) -> bool {
    to_text(actual)
        .to_lowercase()
        .contains(&to_text(Some(expected)).to_lowercase())
}

fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|d| Utc.from_utc_datetime(&d))
            }),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// `daysSince<Field>` / `daysUntil<Field>` against the named date field.
/// The field is looked up verbatim first, then with a lower-cased initial.
fn evaluate_days(condition: &RuleCondition, entity: &Value, now: DateTime<Utc>) -> bool {
    let field = condition.field.as_str();
    let (since, name) = match (field.strip_prefix("daysSince"), field.strip_prefix("daysUntil")) {
        (Some(name), _) if !name.is_empty() => (true, name),
        (_, Some(name)) if !name.is_empty() => (false, name),
        _ => return false,
    };

    let mut chars = name.chars();
    let camel = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
        None => return false,
    };

    let Some(date) = lookup(entity, name)
        .filter(|v| !is_falsy(v))
        .or_else(|| lookup(entity, &camel).filter(|v| !is_falsy(v)))
        .and_then(parse_date)
    else {
        return false;
    };

    let elapsed = (now - date).num_milliseconds().div_euclid(MILLIS_PER_DAY);
    let days = (if since { elapsed } else { -elapsed }) as f64;

    let Some(target) = to_number(Some(&condition.value)) else {
        return false;
    };

    match condition.operator {
        ConditionOperator::Equals => days == target,
        ConditionOperator::GreaterThan => days > target,
        ConditionOperator::LessThan => days < target,
        ConditionOperator::GreaterThanOrEqual => days >= target,
        ConditionOperator::LessThanOrEqual => days <= target,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> RuleCondition {
        RuleCondition {
            field: field.to_string(),
            operator,
            value,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn equality_is_strict() {
        let lead = json!({"status": "NEW", "estimatedValue": 5000.0});
        assert!(evaluate(&cond("status", ConditionOperator::Equals, json!("NEW")), &lead, now()));
        assert!(evaluate(&cond("estimatedValue", ConditionOperator::Equals, json!(5000)), &lead, now()));
        assert!(!evaluate(&cond("estimatedValue", ConditionOperator::Equals, json!("5000")), &lead, now()));
        assert!(evaluate(&cond("missing", ConditionOperator::NotEquals, json!("x")), &lead, now()));
    }

    #[test]
    fn numeric_operators_coerce_strings() {
        let lead = json!({"estimatedValue": "1500", "notes": "abc"});
        assert!(evaluate(&cond("estimatedValue", ConditionOperator::GreaterThan, json!(1000)), &lead, now()));
        assert!(evaluate(&cond("estimatedValue", ConditionOperator::LessThanOrEqual, json!("1500")), &lead, now()));
        assert!(!evaluate(&cond("notes", ConditionOperator::GreaterThan, json!(0)), &lead, now()));
        assert!(!evaluate(&cond("absent", ConditionOperator::LessThan, json!(10)), &lead, now()));
    }

    #[test]
    fn contains_is_case_insensitive() {
        let client = json!({"industry": "FinTech", "skills": ["Rust", "SQL"], "count": 0});
        assert!(evaluate(&cond("industry", ConditionOperator::Contains, json!("tech")), &client, now()));
        assert!(evaluate(&cond("skills", ConditionOperator::Contains, json!("rust,sql")), &client, now()));
        assert!(evaluate(&cond("count", ConditionOperator::NotContains, json!("0")), &client, now()));
        assert!(evaluate(&cond("industry", ConditionOperator::Contains, Value::Null), &client, now()));
    }

    #[test]
    fn null_checks_treat_missing_as_null() {
        let entity = json!({"convertedAt": null, "email": "a@b.co"});
        assert!(evaluate(&cond("convertedAt", ConditionOperator::IsNull, Value::Null), &entity, now()));
        assert!(evaluate(&cond("nope", ConditionOperator::IsNull, Value::Null), &entity, now()));
        assert!(evaluate(&cond("email", ConditionOperator::IsNotNull, Value::Null), &entity, now()));
    }

    #[test]
    fn nested_paths_resolve() {
        let entity = json!({"assignedUser": {"email": "r@x.io"}});
        assert_eq!(lookup(&entity, "assignedUser.email"), Some(&json!("r@x.io")));
        assert_eq!(lookup(&entity, "assignedUser.email.domain"), None);
        assert!(evaluate(
            &cond("assignedUser.email", ConditionOperator::Equals, json!("r@x.io")),
            &entity,
            now()
        ));
    }

    #[test]
    fn days_since_uses_floor_of_elapsed_days() {
        let created = (now() - Duration::hours(24 * 7 + 5)).to_rfc3339();
        let entity = json!({"createdAt": created});
        assert!(evaluate(&cond("daysSinceCreatedAt", ConditionOperator::Equals, json!(7)), &entity, now()));
        assert!(evaluate(&cond("daysSinceCreatedAt", ConditionOperator::GreaterThan, json!(6)), &entity, now()));
        assert!(!evaluate(&cond("daysSinceCreatedAt", ConditionOperator::NotEquals, json!(1)), &entity, now()));
    }

    #[test]
    fn days_until_counts_forward() {
        let entity = json!({"scheduledDate": "2025-03-13"});
        // 2.5 days ahead floors to -3 elapsed, so three days until
        assert!(evaluate(&cond("daysUntilScheduledDate", ConditionOperator::Equals, json!(3)), &entity, now()));
        assert!(!evaluate(&cond("daysUntilMissing", ConditionOperator::LessThan, json!(100)), &entity, now()));
        assert!(!evaluate(&cond("daysUntil", ConditionOperator::LessThan, json!(100)), &entity, now()));
    }

    #[test]
    fn all_conditions_must_match() {
        let lead = json!({"status": "CONTACTED", "estimatedValue": 10});
        let conditions = vec![
            cond("status", ConditionOperator::Equals, json!("CONTACTED")),
            cond("estimatedValue", ConditionOperator::GreaterThan, json!(50)),
        ];
        assert!(!evaluate_all(&conditions, &lead, now()));
        assert!(evaluate_all(&conditions[..1], &lead, now()));
    }
}
