//! Request and response messages for the sync endpoints.
//!
//! Field names follow the JSON shapes the HTTP boundary exchanges
//! (camelCase, with the two historical snake_case exceptions
//! `resolution_applied` and `server_time`).

use crate::conflict::{Conflict, ConflictStrategy};
use crate::entity::{EntityId, EntityType};
use crate::error::{ProtocolError, ProtocolResult};
use crate::operation::{OperationKind, SyncOperation};
use crate::record::SyncRecord;
use crate::resolver::ManualResolution;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Push request from client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Pending operations, in queue order.
    #[serde(default)]
    pub changes: Vec<SyncOperation>,
    /// Strategy the client is configured with.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Client clock at send time. Informational only.
    #[serde(default)]
    pub client_time: Option<Timestamp>,
}

impl PushRequest {
    /// Creates a new push request.
    pub fn new(changes: Vec<SyncOperation>, conflict_strategy: ConflictStrategy) -> Self {
        Self {
            changes,
            conflict_strategy,
            client_time: None,
        }
    }

    /// Sets the client time.
    pub fn with_client_time(mut self, at: Timestamp) -> Self {
        self.client_time = Some(at);
        self
    }
}

/// Outcome of one successfully applied change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// A new record was created.
    Created,
    /// An existing record was updated.
    Updated,
    /// The record was deleted.
    Deleted,
    /// The record was already gone; treated as success.
    AlreadyDeleted,
}

/// Per-change result of an applied operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResult {
    /// Queue entry this result answers.
    #[serde(default)]
    pub op_id: u64,
    /// Operation type.
    pub operation: OperationKind,
    /// Entity type.
    pub entity: EntityType,
    /// Server ID of the affected record.
    pub id: EntityId,
    /// Client correlation ID, echoed for creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// What happened.
    pub status: ChangeStatus,
    /// Record version after the change (0 for deletes).
    #[serde(default)]
    pub version: u64,
}

/// Category of a per-change error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeErrorKind {
    /// Update or resolve target does not exist.
    NotFound,
    /// Payload failed validation.
    Validation,
    /// A field had the wrong type for its entity.
    TypeMismatch,
    /// The change itself is malformed (e.g. update without an ID).
    Invalid,
}

/// Per-change error, with the offending change attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeError {
    /// Error category.
    pub kind: ChangeErrorKind,
    /// Human-readable message.
    pub message: String,
    /// The change that failed.
    pub change: SyncOperation,
}

/// Push response from server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// True when the batch was committed.
    pub success: bool,
    /// Applied changes.
    #[serde(default)]
    pub results: Vec<ChangeResult>,
    /// Conflicts detected; the corresponding changes were not applied.
    #[serde(default)]
    pub conflicts: Vec<Conflict>,
    /// Per-change errors. Non-empty means the batch was rolled back.
    #[serde(default)]
    pub errors: Vec<ChangeError>,
    /// Batch-level error for rejected or aborted batches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Server clock at response time.
    pub server_time: Timestamp,
}

impl PushResponse {
    /// Creates a committed response.
    pub fn committed(
        results: Vec<ChangeResult>,
        conflicts: Vec<Conflict>,
        server_time: Timestamp,
    ) -> Self {
        Self {
            success: true,
            results,
            conflicts,
            errors: Vec::new(),
            error: None,
            server_time,
        }
    }

    /// Creates a response for a batch rolled back because of per-change errors.
    pub fn rejected(errors: Vec<ChangeError>, server_time: Timestamp) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            conflicts: Vec::new(),
            errors,
            error: None,
            server_time,
        }
    }

    /// Creates a response for a batch aborted as a whole.
    pub fn aborted(message: impl Into<String>, server_time: Timestamp) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
            error: Some(message.into()),
            server_time,
        }
    }
}

/// Pull request from client.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Checkpoint; `None` requests a full sync.
    #[serde(default)]
    pub since: Option<Timestamp>,
    /// Entity types to pull; empty means all.
    #[serde(default)]
    pub entities: Vec<EntityType>,
    /// Page size; `None` uses the server default.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Continuation cursor: only records with an ID above this are returned.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub after: BTreeMap<EntityType, EntityId>,
}

impl PullRequest {
    /// Creates a pull request for the given checkpoint and types.
    pub fn new(since: Option<Timestamp>, entities: Vec<EntityType>) -> Self {
        Self {
            since,
            entities,
            limit: None,
            after: BTreeMap::new(),
        }
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the continuation cursor for one entity type.
    pub fn with_after(mut self, entity: EntityType, id: EntityId) -> Self {
        self.after.insert(entity, id);
        self
    }

    /// Returns the requested types, or all of them if none were named.
    pub fn entity_types(&self) -> Vec<EntityType> {
        if self.entities.is_empty() {
            EntityType::ALL.to_vec()
        } else {
            self.entities.clone()
        }
    }

    /// Encodes the continuation cursor as a query parameter
    /// (`customer:10,contact:4`). Returns `None` when there is no cursor.
    pub fn after_param(&self) -> Option<String> {
        if self.after.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .after
            .iter()
            .map(|(entity, id)| format!("{entity}:{id}"))
            .collect();
        Some(parts.join(","))
    }

    /// Parses the continuation cursor query parameter.
    pub fn parse_after(raw: &str) -> ProtocolResult<BTreeMap<EntityType, EntityId>> {
        let mut after = BTreeMap::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (entity, id) = part
                .split_once(':')
                .ok_or_else(|| ProtocolError::InvalidCursor(part.to_string()))?;
            let entity: EntityType = entity.trim().parse()?;
            let id: u64 = id
                .trim()
                .parse()
                .map_err(|_| ProtocolError::InvalidCursor(part.to_string()))?;
            after.insert(entity, EntityId::new(id));
        }
        Ok(after)
    }
}

/// Pull response from server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Always true for a served pull.
    pub success: bool,
    /// Records per entity type, ascending by ID.
    pub data: BTreeMap<EntityType, Vec<SyncRecord>>,
    /// Whether more records exist beyond this page, per entity type.
    pub has_more: BTreeMap<EntityType, bool>,
    /// Server clock at response time; the next checkpoint.
    pub server_time: Timestamp,
}

impl PullResponse {
    /// Returns true if any entity type has another page.
    pub fn any_has_more(&self) -> bool {
        self.has_more.values().any(|more| *more)
    }

    /// Returns the total number of records in this page.
    pub fn record_count(&self) -> usize {
        self.data.values().map(Vec::len).sum()
    }

    /// Returns the highest ID returned for an entity type.
    pub fn last_id(&self, entity: EntityType) -> Option<EntityId> {
        self.data
            .get(&entity)
            .and_then(|records| records.iter().filter_map(SyncRecord::id).max())
    }
}

/// Request to resolve a conflict under an explicit strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveConflictRequest {
    /// Entity type.
    pub entity: EntityType,
    /// Entity ID.
    pub entity_id: EntityId,
    /// Strategy to apply.
    pub resolution: ConflictStrategy,
    /// Client version of the record.
    pub client_data: SyncRecord,
    /// Server version of the record as the client last saw it.
    pub server_data: SyncRecord,
}

impl From<&Conflict> for ResolveConflictRequest {
    fn from(conflict: &Conflict) -> Self {
        Self {
            entity: conflict.entity_type,
            entity_id: conflict.entity_id,
            resolution: ConflictStrategy::default(),
            client_data: conflict.client_data.clone(),
            server_data: conflict.server_data.clone(),
        }
    }
}

/// Result of a conflict resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveConflictResponse {
    /// True when a resolution was produced.
    pub success: bool,
    /// The persisted record. Absent for manual resolutions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<SyncRecord>,
    /// Strategy actually applied.
    pub resolution_applied: ConflictStrategy,
    /// Consistency problems found in the resolved record.
    #[serde(rename = "validationErrors", default, skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    /// Review payload when the strategy was `manual`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<ManualResolution>,
}

/// Server status summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Server clock.
    pub server_time: Timestamp,
    /// Number of stored records per entity type.
    pub entity_counts: BTreeMap<EntityType, usize>,
    /// Whether the entity store is reachable.
    pub sync_available: bool,
}

/// Records changed since a checkpoint, without pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesResponse {
    /// Always true for a served request.
    pub success: bool,
    /// Changed records per entity type.
    pub changes: BTreeMap<EntityType, Vec<SyncRecord>>,
    /// Server clock at response time.
    pub server_time: Timestamp,
}

/// Health probe response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`.
    pub status: String,
    /// Server clock.
    pub timestamp: Timestamp,
    /// `connected` or `disconnected`.
    pub database: String,
}

impl HealthResponse {
    /// Builds a health response from store reachability.
    pub fn new(database_ok: bool, timestamp: Timestamp) -> Self {
        let (status, database) = if database_ok {
            ("healthy", "connected")
        } else {
            ("unhealthy", "disconnected")
        };
        Self {
            status: status.to_string(),
            timestamp,
            database: database.to_string(),
        }
    }

    /// Returns true if the server reported itself healthy.
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
