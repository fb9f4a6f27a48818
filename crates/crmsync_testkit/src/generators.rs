//! Property-based test generators using proptest.
//!
//! Records mix plain fields with names that trigger the special merge
//! rules (dates, counters, notes, mergeable lists).

use crmsync_protocol::{fields, ConflictStrategy, EntityType, SyncRecord};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for entity types.
pub fn entity_type_strategy() -> impl Strategy<Value = EntityType> {
    prop::sample::select(EntityType::ALL.to_vec())
}

/// Strategy for conflict strategies.
pub fn conflict_strategy_strategy() -> impl Strategy<Value = ConflictStrategy> {
    prop::sample::select(ConflictStrategy::ALL.to_vec())
}

/// Strategy for field names, biased towards the ones with merge rules.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => prop::sample::select(vec![
            "name", "note", "tags", "updatedAt", "contractStart", "visitCount",
            "status", "email", "phone", "amount", "description", "categories",
        ])
        .prop_map(str::to_string),
        1 => prop::string::string_regex("[a-z][a-zA-Z]{0,11}").expect("Invalid regex"),
    ]
}

/// Strategy for scalar and list field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        prop::string::string_regex("[a-zA-Z0-9 ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::String),
        (2000i32..2030, 1u32..13, 1u32..29).prop_map(|(y, m, d)| {
            Value::String(format!("{y:04}-{m:02}-{d:02}T00:00:00Z"))
        }),
        prop::collection::vec("[a-z]{1,6}", 0..4)
            .prop_map(|items| Value::Array(items.into_iter().map(Value::String).collect())),
    ]
}

/// Strategy for well-formed records: an `id`, a `version` and up to eight
/// other fields.
pub fn record_strategy() -> impl Strategy<Value = SyncRecord> {
    (
        1u64..10_000,
        0u64..100,
        prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..8),
    )
        .prop_map(|(id, version, extra)| {
            let mut map = Map::new();
            for (name, value) in extra {
                if !fields::SERVER_AUTHORITATIVE.contains(&name.as_str()) {
                    map.insert(name, value);
                }
            }
            map.insert(fields::ID.to_string(), Value::from(id));
            map.insert(fields::VERSION.to_string(), Value::from(version));
            SyncRecord::from_map(map)
        })
}

/// Strategy for a server/client pair describing the same record.
pub fn record_pair_strategy() -> impl Strategy<Value = (SyncRecord, SyncRecord)> {
    (record_strategy(), record_strategy()).prop_map(|(server, mut client)| {
        if let Some(id) = server.id() {
            client.set_id(id);
        }
        (server, client)
    })
}
