//! Review payload for conflicts deferred to a human.

use super::fields;
use super::validate::is_valid_email;
use crate::record::SyncRecord;
use crate::timestamp::parse_timestamp;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ().-]{6,20}$").expect("valid phone regex"));

/// Inferred type of a conflicting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// JSON null.
    Null,
    /// JSON array.
    Array,
    /// JSON boolean.
    Boolean,
    /// Identifier field.
    Id,
    /// Number.
    Numeric,
    /// Parseable date or time.
    Datetime,
    /// Email address.
    Email,
    /// Phone number.
    Phone,
    /// Other string.
    String,
    /// Objects and anything else.
    Unknown,
}

impl ValueKind {
    /// Infers the kind of a field value.
    pub fn infer(field: &str, value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Array(_) => ValueKind::Array,
            Value::Bool(_) => ValueKind::Boolean,
            _ if fields::is_id_field(field) => ValueKind::Id,
            Value::Number(_) => ValueKind::Numeric,
            Value::String(s) => {
                if fields::is_date_field(field) && parse_timestamp(value).is_some() {
                    ValueKind::Datetime
                } else if is_valid_email(s) {
                    ValueKind::Email
                } else if PHONE_REGEX.is_match(s) && s.chars().filter(char::is_ascii_digit).count() >= 6 {
                    ValueKind::Phone
                } else {
                    ValueKind::String
                }
            }
            Value::Object(_) => ValueKind::Unknown,
        }
    }
}

/// Recommended action for one conflicting field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Keep the server value.
    UseServer,
    /// Keep the client value.
    UseClient,
    /// Keep the chronologically later value.
    UseNewest,
    /// Combine both values.
    MergeValues,
    /// No safe automatic choice.
    RequiresReview,
}

/// One field whose values differ between the two records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConflict {
    /// Field name.
    pub field: String,
    /// Server value (null when absent).
    pub server_value: Value,
    /// Client value (null when absent).
    pub client_value: Value,
    /// Inferred type.
    pub kind: ValueKind,
}

/// Suggestion for one conflicting field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionSuggestion {
    /// Field name.
    pub field: String,
    /// Recommended action.
    pub action: SuggestedAction,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Structured payload handed to a human reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualResolution {
    /// Full server record.
    pub server_data: SyncRecord,
    /// Full client record.
    pub client_data: SyncRecord,
    /// Differing fields, sorted by name.
    pub field_conflicts: Vec<FieldConflict>,
    /// One suggestion per conflicting field, same order.
    pub suggestions: Vec<ResolutionSuggestion>,
}

impl ManualResolution {
    /// Builds the review payload for two records.
    pub fn new(server: &SyncRecord, client: &SyncRecord) -> Self {
        let field_conflicts = field_conflicts(server, client);
        let suggestions = field_conflicts.iter().map(suggest).collect();
        Self {
            server_data: server.clone(),
            client_data: client.clone(),
            field_conflicts,
            suggestions,
        }
    }

    /// Returns the suggestion for a field.
    pub fn suggestion(&self, field: &str) -> Option<&ResolutionSuggestion> {
        self.suggestions.iter().find(|s| s.field == field)
    }
}

/// Lists fields whose values differ, absent treated as null.
pub fn field_conflicts(server: &SyncRecord, client: &SyncRecord) -> Vec<FieldConflict> {
    let names: BTreeSet<&str> = server.keys().chain(client.keys()).collect();

    names
        .into_iter()
        .filter_map(|name| {
            let server_value = server.get(name).cloned().unwrap_or(Value::Null);
            let client_value = client.get(name).cloned().unwrap_or(Value::Null);
            if server_value == client_value {
                return None;
            }
            let kind = if server_value.is_null() {
                ValueKind::infer(name, &client_value)
            } else {
                ValueKind::infer(name, &server_value)
            };
            Some(FieldConflict {
                field: name.to_string(),
                server_value,
                client_value,
                kind,
            })
        })
        .collect()
}

/// Suggests an action for one conflicting field.
pub fn suggest(conflict: &FieldConflict) -> ResolutionSuggestion {
    let field = conflict.field.as_str();

    if fields::is_server_authoritative(field) {
        return ResolutionSuggestion {
            field: conflict.field.clone(),
            action: SuggestedAction::UseServer,
            confidence: 1.0,
        };
    }

    let (action, confidence) = if conflict.server_value.is_null() {
        (SuggestedAction::UseClient, 0.95)
    } else if conflict.client_value.is_null() {
        (SuggestedAction::UseServer, 0.95)
    } else {
        match conflict.kind {
            ValueKind::Datetime => (SuggestedAction::UseNewest, 0.8),
            ValueKind::Array => (SuggestedAction::MergeValues, 0.85),
            ValueKind::Numeric if fields::is_counter_field(field) => {
                (SuggestedAction::MergeValues, 0.8)
            }
            ValueKind::String if fields::is_note_field(field) => {
                (SuggestedAction::MergeValues, 0.7)
            }
            ValueKind::Email | ValueKind::Phone => (SuggestedAction::UseClient, 0.7),
            ValueKind::Unknown => (SuggestedAction::RequiresReview, 0.3),
            _ => (SuggestedAction::UseClient, 0.6),
        }
    };

    let confidence = if fields::is_business_critical(field) {
        confidence * 0.5
    } else {
        confidence
    };

    ResolutionSuggestion {
        field: conflict.field.clone(),
        action,
        confidence,
    }
}
