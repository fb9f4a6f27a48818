//! Record, operation and repository fixtures.
//!
//! Fixture helpers panic on malformed input; they are meant for tests.

use chrono::Utc;
use crmsync_core::{Customer, EntityRecord, MemoryRepository, Syncable};
use crmsync_protocol::{
    parse_timestamp_str, EntityId, EntityType, SyncOperation, SyncRecord, Timestamp,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Update time given to seeded entities.
pub const SEED_TIME: &str = "2024-01-01T00:00:00Z";

/// Parses an RFC 3339 timestamp.
pub fn ts(raw: &str) -> Timestamp {
    parse_timestamp_str(raw).unwrap_or_else(|| panic!("bad fixture timestamp: {raw}"))
}

/// Builds a record from a JSON object literal.
pub fn record(value: Value) -> SyncRecord {
    SyncRecord::from_value(value).expect("fixture record must be a JSON object")
}

/// A customer record as the server would send it.
pub fn customer_record(id: u64, version: u64, name: &str) -> SyncRecord {
    record(json!({"id": id, "version": version, "name": name}))
}

/// A stored customer entity with a fixed update time.
pub fn customer(id: u64, version: u64, name: &str) -> EntityRecord {
    let mut entity = EntityRecord::Customer(Customer {
        name: name.to_string(),
        ..Customer::default()
    });
    let meta = entity.meta_mut();
    meta.id = Some(EntityId::new(id));
    meta.version = version;
    meta.created_at = Some(ts(SEED_TIME));
    meta.updated_at = Some(ts(SEED_TIME));
    entity
}

/// A repository holding customers `1..=count`, each at version 1.
pub fn seeded_repository(count: u64) -> Arc<MemoryRepository> {
    let repo = Arc::new(MemoryRepository::new());
    for id in 1..=count {
        repo.seed(customer(id, 1, &format!("Customer {id}")));
    }
    repo
}

/// A create operation for a customer.
pub fn create_customer(op_id: u64, client_id: &str, name: &str) -> SyncOperation {
    let payload = record(json!({"clientId": client_id, "name": name}));
    let mut op = SyncOperation::create(EntityType::Customer, payload, Utc::now());
    op.op_id = op_id;
    op
}

/// An update operation for a customer edited at `version`.
pub fn update_customer(op_id: u64, id: u64, version: u64, name: &str) -> SyncOperation {
    let mut op = SyncOperation::update(
        EntityType::Customer,
        EntityId::new(id),
        customer_record(id, version, name),
        Utc::now(),
    );
    op.op_id = op_id;
    op
}

/// A delete operation.
pub fn delete(op_id: u64, entity_type: EntityType, id: u64) -> SyncOperation {
    let mut op = SyncOperation::delete(entity_type, EntityId::new(id), Utc::now());
    op.op_id = op_id;
    op
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_core::EntityRepository;

    #[test]
    fn seeded_repository_counts() {
        let repo = seeded_repository(4);
        assert_eq!(repo.count(EntityType::Customer).unwrap(), 4);
        let first = repo.find(EntityType::Customer, EntityId::new(1)).unwrap().unwrap();
        assert_eq!(first.version(), 1);
        assert_eq!(first.modified_at(), Some(ts(SEED_TIME)));
    }

    #[test]
    fn operation_fixtures() {
        let create = create_customer(1, "c1", "X");
        assert_eq!(create.correlation_id(), Some("c1"));
        assert_eq!(create.target_id(), None);

        let update = update_customer(2, 5, 3, "Y");
        assert_eq!(update.target_id(), Some(EntityId::new(5)));
        assert_eq!(update.payload.version(), 3);
    }
}
