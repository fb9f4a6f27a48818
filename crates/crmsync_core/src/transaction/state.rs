//! Transaction state.

use crate::entity::EntityRecord;
use crate::error::{CoreError, CoreResult};
use crmsync_protocol::{EntityId, EntityType};
use std::collections::HashMap;

/// Identifies one stored entity.
pub type RecordSlot = (EntityType, EntityId);

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting writes.
    Active,
    /// Applied to the repository.
    Committed,
    /// Discarded.
    Aborted,
}

/// A write staged in a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// Store this entity, replacing any current one.
    Put {
        /// The entity as it will be stored.
        entity: Box<EntityRecord>,
    },
    /// Remove the entity.
    Delete,
}

/// Writes buffered for one push batch.
///
/// Lookups through the transaction see its own staged writes first. The
/// first version observed for each untouched entity is kept, so commit can
/// refuse when another writer got there in between.
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    state: TransactionState,
    staged: HashMap<RecordSlot, PendingWrite>,
    // Commit replays writes in first-touch order.
    order: Vec<RecordSlot>,
    observed: HashMap<RecordSlot, Option<u64>>,
}

impl Transaction {
    /// Opens an empty transaction.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            staged: HashMap::new(),
            order: Vec::new(),
            observed: HashMap::new(),
        }
    }

    /// Sequence number assigned by the repository.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Where the transaction is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// `true` until the transaction is committed or aborted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, TransactionState::Active)
    }

    /// Stages `entity` under its type and ID.
    pub fn put(
        &mut self,
        entity_type: EntityType,
        entity_id: EntityId,
        entity: EntityRecord,
    ) -> CoreResult<()> {
        self.stage(
            (entity_type, entity_id),
            PendingWrite::Put {
                entity: Box::new(entity),
            },
        )
    }

    /// Stages removal of an entity.
    pub fn delete(&mut self, entity_type: EntityType, entity_id: EntityId) -> CoreResult<()> {
        self.stage((entity_type, entity_id), PendingWrite::Delete)
    }

    fn stage(&mut self, slot: RecordSlot, write: PendingWrite) -> CoreResult<()> {
        self.ensure_active()?;
        if self.staged.insert(slot, write).is_none() {
            self.order.push(slot);
        }
        Ok(())
    }

    /// Notes the version the repository held for an entity when it was
    /// loaded. `None` means it did not exist.
    ///
    /// Ignored once the entity has a staged write, and after the first call.
    pub fn observe(&mut self, entity_type: EntityType, entity_id: EntityId, version: Option<u64>) {
        let slot = (entity_type, entity_id);
        if !self.staged.contains_key(&slot) {
            self.observed.entry(slot).or_insert(version);
        }
    }

    /// The staged write for an entity, if any.
    #[must_use]
    pub fn staged(&self, entity_type: EntityType, entity_id: EntityId) -> Option<&PendingWrite> {
        self.staged.get(&(entity_type, entity_id))
    }

    /// Staged writes in first-touch order.
    pub fn pending_writes(&self) -> impl Iterator<Item = (&RecordSlot, &PendingWrite)> {
        self.order
            .iter()
            .filter_map(|slot| self.staged.get(slot).map(|write| (slot, write)))
    }

    /// Number of distinct entities written.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.staged.len()
    }

    /// Versions observed on load, keyed by entity.
    pub fn observed_versions(&self) -> impl Iterator<Item = (&RecordSlot, &Option<u64>)> {
        self.observed.iter()
    }

    /// Ends the transaction after its writes were applied.
    pub fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    /// Ends the transaction and drops everything it staged.
    pub fn mark_aborted(&mut self) {
        self.state = TransactionState::Aborted;
        self.staged.clear();
        self.order.clear();
        self.observed.clear();
    }

    /// Fails with `InvalidOperation` once the transaction has ended.
    pub fn ensure_active(&self) -> CoreResult<()> {
        let ended = match self.state {
            TransactionState::Active => return Ok(()),
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        Err(CoreError::invalid_operation(format!(
            "transaction {} already {ended}",
            self.id
        )))
    }
}
