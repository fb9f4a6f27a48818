//! Field-name heuristics used by merging and manual review.

use crate::record::fields;

/// List fields merged by set union.
pub const MERGEABLE_LISTS: [&str; 3] = ["tags", "categories", "notes"];

/// Returns true if only the server may write this field.
pub fn is_server_authoritative(field: &str) -> bool {
    fields::SERVER_AUTHORITATIVE.contains(&field)
}

/// Returns true if this field is merged by set union when both sides are lists.
pub fn is_mergeable_list(field: &str) -> bool {
    MERGEABLE_LISTS.contains(&field)
}

/// Returns true if the field name suggests a date or time.
pub fn is_date_field(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    field.ends_with("At")
        || lower.ends_with("_at")
        || lower.contains("date")
        || lower.ends_with("time")
        || lower.contains("modified")
}

/// Returns true if the field name suggests a counter or version number.
pub fn is_counter_field(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    ["count", "version", "revision", "sequence"]
        .iter()
        .any(|hint| lower.contains(hint))
}

/// Returns true if the field holds free text that should be concatenated.
pub fn is_note_field(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    ["note", "comment", "description", "remark"]
        .iter()
        .any(|hint| lower.contains(hint))
}

/// Returns true if the field names an identifier.
pub fn is_id_field(field: &str) -> bool {
    field == fields::ID || field.ends_with("Id") || field.to_ascii_lowercase().ends_with("_id")
}

/// Returns true for business-critical fields that need human judgment.
pub fn is_business_critical(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    ["status", "state", "amount", "quantity"]
        .iter()
        .any(|hint| lower.contains(hint))
}
