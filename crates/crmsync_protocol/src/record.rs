//! The record payload exchanged between replicas.

use crate::entity::EntityId;
use crate::error::{ProtocolError, ProtocolResult};
use crate::timestamp::{format_timestamp, parse_timestamp, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Names of the sync metadata fields carried inside every record.
pub mod fields {
    /// Server-assigned identifier.
    pub const ID: &str = "id";
    /// Client-generated correlation identifier.
    pub const CLIENT_ID: &str = "clientId";
    /// Optimistic concurrency token.
    pub const VERSION: &str = "version";
    /// Alternate spelling of the concurrency token.
    pub const SYNC_VERSION: &str = "syncVersion";
    /// Creation time, set by the owning side.
    pub const CREATED_AT: &str = "createdAt";
    /// Last modification time, set by the owning side.
    pub const UPDATED_AT: &str = "updatedAt";
    /// Client-side confirmation time; null means "dirty".
    pub const SYNCED_AT: &str = "syncedAt";
    /// Server-side time of the last successful sync mutation.
    pub const LAST_SYNCED_AT: &str = "lastSyncedAt";

    /// Fields only the server may write, whatever the strategy.
    pub const SERVER_AUTHORITATIVE: [&str; 5] =
        [ID, CREATED_AT, SYNC_VERSION, VERSION, LAST_SYNCED_AT];

    /// Field names probed, in order, for a record's update time.
    pub const UPDATE_TIME_PROBES: [&str; 4] = [UPDATED_AT, "modifiedAt", "lastModified", LAST_SYNCED_AT];
}

/// One entity instance as an opaque field map plus sync metadata.
///
/// The engine never interprets business fields; it only reads and writes
/// the metadata named in [`fields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncRecord(Map<String, Value>);

impl SyncRecord {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps an existing field map.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Converts a JSON value into a record; the value must be an object.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(ProtocolError::NotAnObject("null")),
            Value::Bool(_) => Err(ProtocolError::NotAnObject("boolean")),
            Value::Number(_) => Err(ProtocolError::NotAnObject("number")),
            Value::String(_) => Err(ProtocolError::NotAnObject("string")),
            Value::Array(_) => Err(ProtocolError::NotAnObject("array")),
        }
    }

    /// Returns the record as a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns a field value unless it is absent or null.
    pub fn get_non_null(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    /// Sets a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Removes a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Returns true if the field is present (even if null).
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Iterates over field names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates over fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Returns the server-assigned ID, if any.
    ///
    /// Numeric strings are accepted for payloads produced by form encoders.
    pub fn id(&self) -> Option<EntityId> {
        match self.get_non_null(fields::ID)? {
            Value::Number(n) => n.as_u64().map(EntityId::new),
            Value::String(s) => s.trim().parse().ok().map(EntityId::new),
            _ => None,
        }
    }

    /// Sets the server-assigned ID.
    pub fn set_id(&mut self, id: EntityId) {
        self.insert(fields::ID, Value::from(id.as_u64()));
    }

    /// Returns the client correlation ID, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.get_non_null(fields::CLIENT_ID).and_then(Value::as_str)
    }

    /// Sets the client correlation ID.
    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.insert(fields::CLIENT_ID, Value::String(client_id.into()));
    }

    /// Returns the record version, reading `version` then `syncVersion`.
    ///
    /// Missing or malformed versions read as 0.
    pub fn version(&self) -> u64 {
        [fields::VERSION, fields::SYNC_VERSION]
            .iter()
            .filter_map(|f| self.get_non_null(f))
            .find_map(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .unwrap_or(0)
    }

    /// Sets the record version, keeping `syncVersion` aligned when present.
    pub fn set_version(&mut self, version: u64) {
        self.insert(fields::VERSION, Value::from(version));
        if self.contains(fields::SYNC_VERSION) {
            self.insert(fields::SYNC_VERSION, Value::from(version));
        }
    }

    /// Returns the client-side confirmation time.
    pub fn synced_at(&self) -> Option<Timestamp> {
        self.timestamp(fields::SYNCED_AT)
    }

    /// Returns true if the record carries local changes the server has not confirmed.
    pub fn is_dirty(&self) -> bool {
        self.synced_at().is_none()
    }

    /// Stamps the record as confirmed by the server at `at`.
    pub fn mark_synced(&mut self, at: Timestamp) {
        self.insert(fields::SYNCED_AT, Value::String(format_timestamp(&at)));
    }

    /// Clears the confirmation stamp, flagging local changes.
    pub fn mark_dirty(&mut self) {
        self.insert(fields::SYNCED_AT, Value::Null);
    }

    /// Returns the `updatedAt` timestamp.
    pub fn updated_at(&self) -> Option<Timestamp> {
        self.timestamp(fields::UPDATED_AT)
    }

    /// Returns the first parseable update time among the probe fields.
    pub fn update_time(&self) -> Option<Timestamp> {
        fields::UPDATE_TIME_PROBES
            .iter()
            .find_map(|field| self.timestamp(field))
    }

    /// Parses a field as a timestamp.
    pub fn timestamp(&self, field: &str) -> Option<Timestamp> {
        self.get_non_null(field).and_then(parse_timestamp)
    }

    /// Sets a field to a formatted timestamp.
    pub fn set_timestamp(&mut self, field: &str, at: Timestamp) {
        self.insert(field, Value::String(format_timestamp(&at)));
    }
}

impl From<Map<String, Value>> for SyncRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for SyncRecord {
    type Error = ProtocolError;

    fn try_from(value: Value) -> ProtocolResult<Self> {
        Self::from_value(value)
    }
}
