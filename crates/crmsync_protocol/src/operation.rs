//! Sync operations.

use crate::entity::{EntityId, EntityType};
use crate::error::ProtocolError;
use crate::record::SyncRecord;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Record was created locally and has no server ID yet.
    Create,
    /// Record was modified locally.
    Update,
    /// Record was deleted locally.
    Delete,
}

impl OperationKind {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            _ => Err(ProtocolError::UnknownOperation(s.to_string())),
        }
    }
}

/// One entry in the client's pending queue.
///
/// A `SyncOperation` is created when a local mutation happens and leaves
/// the queue only after the server confirms it. Apart from `retry_count`
/// it is never mutated.
///
/// # Fields
///
/// - `op_id`: Local queue identifier (monotonically increasing per store)
/// - `entity_type`: Which kind of record is affected
/// - `entity_id`: Server ID, `None` for records not yet created remotely
/// - `client_id`: Correlation ID assigned at local creation
/// - `operation`: Create, update or delete
/// - `payload`: Snapshot of the record at mutation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    /// Local queue identifier, echoed back in push results.
    #[serde(default)]
    pub op_id: u64,
    /// Entity type.
    #[serde(rename = "entity")]
    pub entity_type: EntityType,
    /// Server ID, if known.
    #[serde(default)]
    pub entity_id: Option<EntityId>,
    /// Client correlation ID.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Operation type.
    pub operation: OperationKind,
    /// Record snapshot.
    #[serde(rename = "data", default)]
    pub payload: SyncRecord,
    /// When the local mutation happened.
    pub timestamp: Timestamp,
    /// Number of rejected push attempts.
    #[serde(default)]
    pub retry_count: u32,
}

impl SyncOperation {
    /// Creates a create operation. The client ID is taken from the payload.
    pub fn create(entity_type: EntityType, payload: SyncRecord, timestamp: Timestamp) -> Self {
        Self {
            op_id: 0,
            entity_type,
            entity_id: None,
            client_id: payload.client_id().map(str::to_string),
            operation: OperationKind::Create,
            payload,
            timestamp,
            retry_count: 0,
        }
    }

    /// Creates an update operation for an existing server record.
    pub fn update(
        entity_type: EntityType,
        entity_id: EntityId,
        payload: SyncRecord,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            op_id: 0,
            entity_type,
            entity_id: Some(entity_id),
            client_id: payload.client_id().map(str::to_string),
            operation: OperationKind::Update,
            payload,
            timestamp,
            retry_count: 0,
        }
    }

    /// Creates a delete operation.
    pub fn delete(entity_type: EntityType, entity_id: EntityId, timestamp: Timestamp) -> Self {
        Self {
            op_id: 0,
            entity_type,
            entity_id: Some(entity_id),
            client_id: None,
            operation: OperationKind::Delete,
            payload: SyncRecord::new(),
            timestamp,
            retry_count: 0,
        }
    }

    /// Returns the target ID, falling back to the payload's `id` field.
    pub fn target_id(&self) -> Option<EntityId> {
        self.entity_id.or_else(|| self.payload.id())
    }

    /// Returns the client correlation ID, falling back to the payload.
    pub fn correlation_id(&self) -> Option<&str> {
        self.client_id
            .as_deref()
            .or_else(|| self.payload.client_id())
    }

    /// An update or delete of a record whose create has not been
    /// correlated to a server ID yet. It cannot be pushed until bound.
    pub fn is_unbound(&self) -> bool {
        self.operation != OperationKind::Create && self.target_id().is_none()
    }

    /// Points the operation at the server record its create produced.
    pub fn bind(&mut self, id: EntityId, version: u64) {
        self.entity_id = Some(id);
        self.payload.set_id(id);
        self.payload.set_version(version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::parse_timestamp_str;
    use serde_json::json;

    fn ts() -> Timestamp {
        parse_timestamp_str("2024-01-01T00:00:00Z").unwrap()
    }

    #[test]
    fn operation_kind_names() {
        assert_eq!(OperationKind::Create.as_str(), "create");
        assert_eq!("delete".parse::<OperationKind>().unwrap(), OperationKind::Delete);
        assert!("upsert".parse::<OperationKind>().is_err());
    }

    #[test]
    fn create_takes_client_id_from_payload() {
        let payload = SyncRecord::new().with("clientId", "c1").with("name", "X");
        let op = SyncOperation::create(EntityType::Customer, payload, ts());
        assert_eq!(op.client_id.as_deref(), Some("c1"));
        assert_eq!(op.entity_id, None);
        assert_eq!(op.retry_count, 0);
    }

    #[test]
    fn wire_shape() {
        let op = SyncOperation::create(
            EntityType::Customer,
            SyncRecord::new().with("name", "X"),
            ts(),
        );
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["operation"], json!("create"));
        assert_eq!(value["entity"], json!("customer"));
        assert_eq!(value["data"], json!({"name": "X"}));

        let parsed: SyncOperation = serde_json::from_value(json!({
            "operation": "update",
            "entity": "contact",
            "data": {"id": 9, "version": 2},
            "clientId": "c9",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(parsed.operation, OperationKind::Update);
        assert_eq!(parsed.target_id(), Some(EntityId::new(9)));
        assert_eq!(parsed.correlation_id(), Some("c9"));
        assert_eq!(parsed.op_id, 0);
    }

    #[test]
    fn update_without_target_waits_for_binding() {
        let payload = SyncRecord::new().with("clientId", "c1").with("name", "Y");
        let mut op = SyncOperation {
            operation: OperationKind::Update,
            ..SyncOperation::create(EntityType::Customer, payload, ts())
        };
        assert!(op.is_unbound());

        op.bind(EntityId::new(12), 1);
        assert!(!op.is_unbound());
        assert_eq!(op.target_id(), Some(EntityId::new(12)));
        assert_eq!(op.payload.version(), 1);
        assert_eq!(op.correlation_id(), Some("c1"));

        let create = SyncOperation::create(EntityType::Customer, SyncRecord::new(), ts());
        assert!(!create.is_unbound());
    }

    #[test]
    fn delete_has_empty_payload() {
        let op = SyncOperation::delete(EntityType::Comment, EntityId::new(3), ts());
        assert!(op.payload.is_empty());
        assert_eq!(op.target_id(), Some(EntityId::new(3)));
    }
}
