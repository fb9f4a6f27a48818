//! Field-level merge.
//!
//! The fallback for mismatched scalars prefers the client value. That is a
//! heuristic carried over for compatibility, not a principled CRDT merge:
//! new field types may need their own rule.

use super::fields;
use crate::record::SyncRecord;
use crate::timestamp::parse_timestamp;
use serde_json::Value;
use std::collections::BTreeSet;

/// Separator placed between server and client text in merged notes.
pub const NOTE_SEPARATOR: &str = "\n---\n";

/// Merges two versions of a record field by field.
///
/// Server-authoritative fields are copied from the server, and dropped when
/// the server record lacks them.
pub fn merge(server: &SyncRecord, client: &SyncRecord) -> SyncRecord {
    let names: BTreeSet<&str> = server.keys().chain(client.keys()).collect();

    let mut merged = SyncRecord::new();
    for name in names {
        if fields::is_server_authoritative(name) && server.get(name).is_none() {
            continue;
        }
        let value = merge_field(name, server.get(name), client.get(name));
        merged.insert(name, value);
    }
    merged
}

/// Merges a single field.
///
/// `None` means the field is absent on that side. A server-authoritative
/// field never takes the client value.
pub fn merge_field(field: &str, server: Option<&Value>, client: Option<&Value>) -> Value {
    if fields::is_server_authoritative(field) {
        return server.cloned().unwrap_or(Value::Null);
    }

    let server_value = server.filter(|v| !v.is_null());
    let client_value = client.filter(|v| !v.is_null());

    let (s, c) = match (server_value, client_value) {
        (None, None) => return Value::Null,
        (Some(s), None) => return s.clone(),
        (None, Some(c)) => return c.clone(),
        (Some(s), Some(c)) => (s, c),
    };

    if s == c {
        return s.clone();
    }

    if fields::is_mergeable_list(field) {
        if let (Value::Array(a), Value::Array(b)) = (s, c) {
            return Value::Array(union(a, b));
        }
    }

    if fields::is_date_field(field) {
        if let (Some(st), Some(ct)) = (parse_timestamp(s), parse_timestamp(c)) {
            return if ct > st { c.clone() } else { s.clone() };
        }
    }

    if fields::is_counter_field(field) {
        if let (Some(a), Some(b)) = (s.as_f64(), c.as_f64()) {
            return if b > a { c.clone() } else { s.clone() };
        }
    }

    if fields::is_note_field(field) {
        if let (Value::String(a), Value::String(b)) = (s, c) {
            return Value::String(format!("{a}{NOTE_SEPARATOR}{b}"));
        }
    }

    c.clone()
}

/// Set union keeping server order, then unseen client items.
fn union(server: &[Value], client: &[Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(server.len() + client.len());
    for item in server.iter().chain(client) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}
