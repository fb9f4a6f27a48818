//! Local replica store.
//!
//! Three tables: records per entity type, the pending operation queue and
//! a metadata table holding the checkpoint and form drafts. A record with
//! `syncedAt = null` has local changes the server has not confirmed.

use crate::error::{SyncError, SyncResult};
use chrono::Utc;
use crmsync_protocol::{
    fields, EntityId, EntityType, OperationKind, SyncOperation, SyncRecord, Timestamp,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::debug;
use uuid::Uuid;

/// Client-resident record store with a pending-operation log.
///
/// Required methods are storage primitives. The provided `record_*` methods
/// implement local mutations on top of them: each writes the record, marks
/// it dirty and appends the matching operation to the queue.
pub trait LocalReplicaStore: Send + Sync {
    /// Returns a record by server ID.
    fn get(&self, entity_type: EntityType, id: EntityId) -> SyncResult<Option<SyncRecord>>;

    /// Returns a record by client correlation ID.
    fn find_by_client_id(
        &self,
        entity_type: EntityType,
        client_id: &str,
    ) -> SyncResult<Option<SyncRecord>>;

    /// Returns every record of a type.
    fn records(&self, entity_type: EntityType) -> SyncResult<Vec<SyncRecord>>;

    /// Inserts or replaces a record, matched by server ID, else client ID.
    fn put(&self, entity_type: EntityType, record: SyncRecord) -> SyncResult<()>;

    /// Removes a record, matched by server ID, else client ID.
    fn remove(&self, entity_type: EntityType, record: &SyncRecord) -> SyncResult<bool>;

    /// Appends an operation, assigning its `op_id`. Returns the ID.
    fn enqueue(&self, op: SyncOperation) -> SyncResult<u64>;

    /// Returns every queued operation in queue order.
    fn pending_operations(&self) -> SyncResult<Vec<SyncOperation>>;

    /// Removes operations by ID. Returns how many were removed.
    fn remove_operations(&self, op_ids: &[u64]) -> SyncResult<usize>;

    /// Increments `retry_count` of the given operations.
    fn increment_retry(&self, op_ids: &[u64]) -> SyncResult<()>;

    /// Marks operations as part of a push in progress and returns those
    /// still queued, in queue order.
    fn mark_in_flight(&self, op_ids: &[u64]) -> SyncResult<Vec<SyncOperation>>;

    /// Ends the push started by [`mark_in_flight`](Self::mark_in_flight).
    fn clear_in_flight(&self) -> SyncResult<()>;

    /// Removes the queued create of a record that has no server ID yet,
    /// together with any unbound operations for it, unless the create is
    /// in flight.
    fn withdraw_create(&self, entity_type: EntityType, client_id: &str) -> SyncResult<Withdrawal>;

    /// Records the server ID a create produced and binds every queued
    /// operation for that client ID to it. Operations enqueued later for
    /// the same client ID are bound on arrival. Returns how many were bound.
    fn bind_pending(
        &self,
        entity_type: EntityType,
        client_id: &str,
        id: EntityId,
        version: u64,
    ) -> SyncResult<usize>;

    /// Returns the pull checkpoint.
    fn checkpoint(&self) -> SyncResult<Option<Timestamp>>;

    /// Stores the pull checkpoint.
    fn set_checkpoint(&self, at: Timestamp) -> SyncResult<()>;

    /// Returns records with unconfirmed local changes.
    fn unsynced(&self, entity_type: EntityType) -> SyncResult<Vec<SyncRecord>> {
        Ok(self
            .records(entity_type)?
            .into_iter()
            .filter(SyncRecord::is_dirty)
            .collect())
    }

    /// Returns the number of queued operations.
    fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.pending_operations()?.len())
    }

    /// Writes a server-confirmed record, stamping it synced.
    fn put_synced(&self, entity_type: EntityType, mut record: SyncRecord, at: Timestamp) -> SyncResult<()> {
        record.mark_synced(at);
        self.put(entity_type, record)
    }

    /// Creates a record locally. Returns its new client ID.
    fn record_create(&self, entity_type: EntityType, mut record: SyncRecord) -> SyncResult<String> {
        let now = Utc::now();
        let client_id = match record.client_id() {
            Some(existing) => existing.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        record.remove(fields::ID);
        record.set_client_id(client_id.clone());
        record.set_version(0);
        record.set_timestamp(fields::CREATED_AT, now);
        record.set_timestamp(fields::UPDATED_AT, now);
        record.mark_dirty();

        self.put(entity_type, record.clone())?;
        self.enqueue(SyncOperation::create(entity_type, record, now))?;
        debug!(entity = %entity_type, %client_id, "local create queued");
        Ok(client_id)
    }

    /// Applies field changes to a local record.
    ///
    /// `key` is the server ID or, for records never pushed, the client ID.
    /// A record that was never pushed has its pending create replaced by a
    /// fresh snapshot instead of gaining an update. If that create is
    /// already on its way to the server, an unbound update is queued and
    /// sent once the create is correlated.
    fn record_update(
        &self,
        entity_type: EntityType,
        key: &RecordKey,
        changes: SyncRecord,
    ) -> SyncResult<()> {
        let mut record = self
            .lookup(entity_type, key)?
            .ok_or_else(|| SyncError::record_not_found(entity_type, key))?;
        let now = Utc::now();
        for (field, value) in changes.iter() {
            if !fields::SERVER_AUTHORITATIVE.contains(&field) && field != fields::CLIENT_ID {
                record.insert(field, value.clone());
            }
        }
        record.set_timestamp(fields::UPDATED_AT, now);
        record.mark_dirty();
        self.put(entity_type, record.clone())?;

        let client_id = record.client_id().map(str::to_string);
        let op = match (record.id(), client_id.as_deref()) {
            (Some(id), _) => SyncOperation::update(entity_type, id, record, now),
            (None, Some(client_id)) => match self.withdraw_create(entity_type, client_id)? {
                Withdrawal::Withdrawn => SyncOperation::create(entity_type, record, now),
                Withdrawal::InFlight | Withdrawal::Absent => SyncOperation {
                    operation: OperationKind::Update,
                    ..SyncOperation::create(entity_type, record, now)
                },
            },
            (None, None) => SyncOperation::create(entity_type, record, now),
        };
        self.enqueue(op)?;
        debug!(entity = %entity_type, %key, "local update queued");
        Ok(())
    }

    /// Deletes a local record.
    ///
    /// A record that was never pushed simply loses its pending create,
    /// unless that create is in flight.
    fn record_delete(&self, entity_type: EntityType, key: &RecordKey) -> SyncResult<()> {
        let record = self
            .lookup(entity_type, key)?
            .ok_or_else(|| SyncError::record_not_found(entity_type, key))?;
        self.remove(entity_type, &record)?;

        let now = Utc::now();
        let client_id = record.client_id().map(str::to_string);
        match (record.id(), client_id.as_deref()) {
            (Some(id), _) => {
                let mut op = SyncOperation::delete(entity_type, id, now);
                op.client_id = client_id.clone();
                self.enqueue(op)?;
            }
            (None, Some(client_id)) => {
                if self.withdraw_create(entity_type, client_id)? != Withdrawal::Withdrawn {
                    self.enqueue(SyncOperation {
                        operation: OperationKind::Delete,
                        payload: SyncRecord::new(),
                        ..SyncOperation::create(entity_type, record, now)
                    })?;
                }
            }
            (None, None) => {}
        }
        debug!(entity = %entity_type, %key, "local delete queued");
        Ok(())
    }

    /// Looks a record up by either kind of key.
    fn lookup(&self, entity_type: EntityType, key: &RecordKey) -> SyncResult<Option<SyncRecord>> {
        match key {
            RecordKey::Id(id) => self.get(entity_type, *id),
            RecordKey::Client(client_id) => self.find_by_client_id(entity_type, client_id),
        }
    }
}

/// Result of [`LocalReplicaStore::withdraw_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Withdrawal {
    /// The create was still queued and has been removed.
    Withdrawn,
    /// The create is part of a push in progress and was kept.
    InFlight,
    /// No create is queued: it was never made or the server has it.
    Absent,
}

/// How a local record is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    /// Server-assigned ID.
    Id(EntityId),
    /// Client correlation ID.
    Client(String),
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Id(id) => write!(f, "{id}"),
            RecordKey::Client(client_id) => f.write_str(client_id),
        }
    }
}

impl From<EntityId> for RecordKey {
    fn from(id: EntityId) -> Self {
        RecordKey::Id(id)
    }
}

impl From<&str> for RecordKey {
    fn from(client_id: &str) -> Self {
        RecordKey::Client(client_id.to_string())
    }
}

/// Metadata table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Pull checkpoint.
    #[serde(default)]
    pub last_sync_time: Option<Timestamp>,
    /// Form draft snapshots by form name.
    #[serde(default)]
    pub drafts: BTreeMap<String, Value>,
}

/// Serialized form of a [`MemoryReplicaStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaSnapshot {
    /// Records per entity type.
    #[serde(default)]
    pub records: BTreeMap<EntityType, Vec<SyncRecord>>,
    /// Pending operations.
    #[serde(default)]
    pub queue: Vec<SyncOperation>,
    /// Next operation ID to assign.
    #[serde(default = "first_op_id")]
    pub next_op_id: u64,
    /// Metadata table.
    #[serde(default)]
    pub metadata: Metadata,
}

fn first_op_id() -> u64 {
    1
}

/// In-memory [`LocalReplicaStore`] that can be saved to and loaded from a
/// JSON file.
#[derive(Debug)]
pub struct MemoryReplicaStore {
    inner: RwLock<ReplicaSnapshot>,
    // Not persisted: both only matter while a cycle runs.
    links: RwLock<Links>,
}

#[derive(Debug, Default)]
struct Links {
    in_flight: BTreeSet<u64>,
    bound: BTreeMap<(EntityType, String), (EntityId, u64)>,
}

impl Default for MemoryReplicaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReplicaStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::from_snapshot(ReplicaSnapshot {
            next_op_id: first_op_id(),
            ..ReplicaSnapshot::default()
        })
    }

    /// Restores a store from a snapshot.
    pub fn from_snapshot(snapshot: ReplicaSnapshot) -> Self {
        Self {
            inner: RwLock::new(snapshot),
            links: RwLock::new(Links::default()),
        }
    }

    /// Returns a copy of the three tables.
    pub fn snapshot(&self) -> ReplicaSnapshot {
        self.inner.read().clone()
    }

    /// Writes the store to `path` as JSON.
    pub fn save_to(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let json = serde_json::to_vec_pretty(&*self.inner.read())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads a store written by [`save_to`](Self::save_to).
    pub fn load_from(path: impl AsRef<Path>) -> SyncResult<Self> {
        let bytes = std::fs::read(path)?;
        let mut snapshot: ReplicaSnapshot = serde_json::from_slice(&bytes)?;
        let highest = snapshot.queue.iter().map(|op| op.op_id).max().unwrap_or(0);
        snapshot.next_op_id = snapshot.next_op_id.max(highest + 1);
        Ok(Self::from_snapshot(snapshot))
    }

    /// Saves a form draft.
    pub fn save_draft(&self, form: impl Into<String>, data: Value) {
        self.inner.write().metadata.drafts.insert(form.into(), data);
    }

    /// Returns a form draft.
    pub fn draft(&self, form: &str) -> Option<Value> {
        self.inner.read().metadata.drafts.get(form).cloned()
    }

    /// Discards a form draft.
    pub fn clear_draft(&self, form: &str) -> bool {
        self.inner.write().metadata.drafts.remove(form).is_some()
    }
}

fn position(records: &[SyncRecord], record: &SyncRecord) -> Option<usize> {
    if let Some(id) = record.id() {
        if let Some(pos) = records.iter().position(|r| r.id() == Some(id)) {
            return Some(pos);
        }
    }
    let client_id = record.client_id()?;
    records
        .iter()
        .position(|r| r.client_id() == Some(client_id))
}

impl LocalReplicaStore for MemoryReplicaStore {
    fn get(&self, entity_type: EntityType, id: EntityId) -> SyncResult<Option<SyncRecord>> {
        Ok(self
            .inner
            .read()
            .records
            .get(&entity_type)
            .and_then(|table| table.iter().find(|r| r.id() == Some(id)).cloned()))
    }

    fn find_by_client_id(
        &self,
        entity_type: EntityType,
        client_id: &str,
    ) -> SyncResult<Option<SyncRecord>> {
        Ok(self.inner.read().records.get(&entity_type).and_then(|table| {
            table
                .iter()
                .find(|r| r.client_id() == Some(client_id))
                .cloned()
        }))
    }

    fn records(&self, entity_type: EntityType) -> SyncResult<Vec<SyncRecord>> {
        Ok(self
            .inner
            .read()
            .records
            .get(&entity_type)
            .cloned()
            .unwrap_or_default())
    }

    fn put(&self, entity_type: EntityType, record: SyncRecord) -> SyncResult<()> {
        if record.id().is_none() && record.client_id().is_none() {
            return Err(SyncError::Store(format!(
                "{entity_type} record has neither id nor clientId"
            )));
        }
        let mut inner = self.inner.write();
        let table = inner.records.entry(entity_type).or_default();
        match position(table, &record) {
            Some(pos) => table[pos] = record,
            None => table.push(record),
        }
        Ok(())
    }

    fn remove(&self, entity_type: EntityType, record: &SyncRecord) -> SyncResult<bool> {
        let mut inner = self.inner.write();
        let Some(table) = inner.records.get_mut(&entity_type) else {
            return Ok(false);
        };
        match position(table, record) {
            Some(pos) => {
                table.remove(pos);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn enqueue(&self, mut op: SyncOperation) -> SyncResult<u64> {
        let mut inner = self.inner.write();
        if op.is_unbound() {
            if let Some(client_id) = op.correlation_id() {
                let key = (op.entity_type, client_id.to_string());
                if let Some(&(id, version)) = self.links.read().bound.get(&key) {
                    op.bind(id, version);
                }
            }
        }
        let op_id = inner.next_op_id;
        inner.next_op_id += 1;
        op.op_id = op_id;
        inner.queue.push(op);
        Ok(op_id)
    }

    fn pending_operations(&self) -> SyncResult<Vec<SyncOperation>> {
        Ok(self.inner.read().queue.clone())
    }

    fn remove_operations(&self, op_ids: &[u64]) -> SyncResult<usize> {
        let mut inner = self.inner.write();
        let before = inner.queue.len();
        inner.queue.retain(|op| !op_ids.contains(&op.op_id));
        Ok(before - inner.queue.len())
    }

    fn increment_retry(&self, op_ids: &[u64]) -> SyncResult<()> {
        let mut inner = self.inner.write();
        for op in inner.queue.iter_mut().filter(|op| op_ids.contains(&op.op_id)) {
            op.retry_count += 1;
        }
        Ok(())
    }

    fn mark_in_flight(&self, op_ids: &[u64]) -> SyncResult<Vec<SyncOperation>> {
        let inner = self.inner.read();
        let mut links = self.links.write();
        let batch: Vec<SyncOperation> = inner
            .queue
            .iter()
            .filter(|op| op_ids.contains(&op.op_id))
            .cloned()
            .collect();
        links.in_flight.extend(batch.iter().map(|op| op.op_id));
        Ok(batch)
    }

    fn clear_in_flight(&self) -> SyncResult<()> {
        self.links.write().in_flight.clear();
        Ok(())
    }

    fn withdraw_create(&self, entity_type: EntityType, client_id: &str) -> SyncResult<Withdrawal> {
        let mut inner = self.inner.write();
        let links = self.links.read();
        let belongs = |op: &SyncOperation| -> bool {
            op.entity_type == entity_type && op.correlation_id() == Some(client_id)
        };
        let Some(create) = inner
            .queue
            .iter()
            .find(|op| op.operation == OperationKind::Create && belongs(*op))
        else {
            return Ok(Withdrawal::Absent);
        };
        if links.in_flight.contains(&create.op_id) {
            return Ok(Withdrawal::InFlight);
        }
        inner
            .queue
            .retain(|op| !(belongs(op) && (op.operation == OperationKind::Create || op.is_unbound())));
        Ok(Withdrawal::Withdrawn)
    }

    fn bind_pending(
        &self,
        entity_type: EntityType,
        client_id: &str,
        id: EntityId,
        version: u64,
    ) -> SyncResult<usize> {
        let mut inner = self.inner.write();
        self.links
            .write()
            .bound
            .insert((entity_type, client_id.to_string()), (id, version));
        let mut bound = 0;
        for op in inner.queue.iter_mut().filter(|op| {
            op.entity_type == entity_type && op.is_unbound() && op.correlation_id() == Some(client_id)
        }) {
            op.bind(id, version);
            bound += 1;
        }
        Ok(bound)
    }

    fn checkpoint(&self) -> SyncResult<Option<Timestamp>> {
        Ok(self.inner.read().metadata.last_sync_time)
    }

    fn set_checkpoint(&self, at: Timestamp) -> SyncResult<()> {
        self.inner.write().metadata.last_sync_time = Some(at);
        Ok(())
    }
}
