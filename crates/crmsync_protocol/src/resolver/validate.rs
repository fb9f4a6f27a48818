//! Consistency checks on resolved records.

use crate::record::{fields, SyncRecord};
use crate::timestamp::parse_timestamp;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

/// Returns true if the string looks like an email address.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

/// Checks a resolved record and returns human-readable problems.
///
/// An empty list means the record is consistent. Problems are reported,
/// never raised: the caller decides whether to apply the record anyway.
pub fn validate(record: &SyncRecord) -> Vec<String> {
    let mut errors = Vec::new();

    if record.get_non_null(fields::ID).is_none() {
        errors.push("missing identity field 'id'".to_string());
    }

    for (name, value) in record.iter() {
        if !name.to_ascii_lowercase().contains("email") {
            continue;
        }
        if let Value::String(email) = value {
            if !email.is_empty() && !is_valid_email(email) {
                errors.push(format!("field '{name}' is not a valid email address: {email}"));
            }
        }
    }

    let start = first_matching(record, "start");
    let end = first_matching(record, "end");
    if let (Some((start_name, start_at)), Some((end_name, end_at))) = (start, end) {
        if start_at > end_at {
            errors.push(format!("'{start_name}' is after '{end_name}'"));
        }
    }

    errors
}

/// First field named by `hint` that holds a parseable date.
fn first_matching<'a>(
    record: &'a SyncRecord,
    hint: &str,
) -> Option<(&'a str, crate::timestamp::Timestamp)> {
    record
        .iter()
        .filter(|(name, _)| names_bound(name, hint))
        .find_map(|(name, value)| parse_timestamp(value).map(|at| (name, at)))
}

/// True if `hint` starts the field name or is one of its words, so
/// `endDate`, `contractEnd` and `end_at` match "end" but `sendAt` does not.
fn names_bound(name: &str, hint: &str) -> bool {
    name.to_ascii_lowercase().starts_with(hint) || name_words(name).any(|word| word == hint)
}

/// Splits a camelCase, snake_case or kebab-case name into lowercase words.
fn name_words(name: &str) -> impl Iterator<Item = String> + '_ {
    name.split(['_', '-', ' '])
        .flat_map(|part| {
            let mut words = Vec::new();
            let mut current = String::new();
            for ch in part.chars() {
                if ch.is_ascii_uppercase() && !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                current.push(ch.to_ascii_lowercase());
            }
            words.push(current);
            words
        })
        .filter(|word| !word.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> SyncRecord {
        SyncRecord::from_value(value).unwrap()
    }

    #[test]
    fn consistent_record_has_no_errors() {
        let r = record(json!({
            "id": 1,
            "email": "jane@example.com",
            "contractStart": "2024-01-01",
            "contractEnd": "2025-01-01"
        }));
        assert!(validate(&r).is_empty());
    }

    #[test]
    fn missing_id_is_reported() {
        let errors = validate(&record(json!({"id": null, "name": "X"})));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("id"));

        assert_eq!(validate(&record(json!({"name": "X"}))).len(), 1);
    }

    #[test]
    fn bad_email_is_reported() {
        let errors = validate(&record(json!({"id": 1, "contactEmail": "not-an-email"})));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("contactEmail"));

        assert!(validate(&record(json!({"id": 1, "email": ""}))).is_empty());
    }

    #[test]
    fn inverted_date_range_is_reported() {
        let errors = validate(&record(json!({
            "id": 1,
            "contractStart": "2025-06-01",
            "contractEnd": "2025-01-01"
        })));
        assert_eq!(errors, vec!["'contractStart' is after 'contractEnd'".to_string()]);
    }

    #[test]
    fn range_fields_match_whole_words_only() {
        // `attendedAt` and `sendAt` merely contain "end".
        let r = record(json!({
            "id": 1,
            "attendedAt": "2024-01-01",
            "sendAt": "2024-01-02",
            "startDate": "2024-06-01"
        }));
        assert!(validate(&r).is_empty());

        let errors = validate(&record(json!({
            "id": 1,
            "start_at": "2024-06-01",
            "end_at": "2024-01-01"
        })));
        assert_eq!(errors, vec!["'start_at' is after 'end_at'".to_string()]);
    }

    #[test]
    fn name_matching() {
        assert!(names_bound("endDate", "end"));
        assert!(names_bound("contractEnd", "end"));
        assert!(names_bound("end_at", "end"));
        assert!(names_bound("contract-start", "start"));
        assert!(!names_bound("attendedAt", "end"));
        assert!(!names_bound("sendAt", "end"));
        assert!(!names_bound("restartedAt", "start"));
    }

    #[test]
    fn unparseable_dates_are_ignored() {
        let r = record(json!({"id": 1, "startDate": "tbd", "endDate": "2025-01-01"}));
        assert!(validate(&r).is_empty());
    }

    #[test]
    fn email_check() {
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@example.com"));
    }
}
