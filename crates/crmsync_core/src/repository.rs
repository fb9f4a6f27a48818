//! Entity repository.
//!
//! [`EntityRepository`] is the server-of-record seam the orchestrator
//! works against. [`MemoryRepository`] is the in-process implementation
//! used by the CLI server and tests.

use crate::entity::{EntityRecord, Syncable};
use crate::error::{CoreError, CoreResult};
use crate::transaction::{PendingWrite, Transaction};
use crmsync_protocol::{EntityId, EntityType, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// One page of a modified-since query.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Records in ascending ID order, at most `limit` of them.
    pub records: Vec<EntityRecord>,
    /// Number of records matching the query before the limit.
    pub total: usize,
}

impl Page {
    /// Returns true if more records match than were returned.
    pub fn has_more(&self) -> bool {
        self.total > self.records.len()
    }
}

/// Server-side persistent store, queried by entity type.
pub trait EntityRepository: Send + Sync {
    /// Starts a transaction.
    fn begin(&self) -> CoreResult<Transaction>;

    /// Loads an entity by ID.
    fn find(&self, entity_type: EntityType, id: EntityId) -> CoreResult<Option<EntityRecord>>;

    /// Returns entities modified strictly after `since` (all when `None`)
    /// with an ID above `after`, ascending by ID, capped at `limit`.
    fn find_modified_since(
        &self,
        entity_type: EntityType,
        since: Option<Timestamp>,
        after: Option<EntityId>,
        limit: usize,
    ) -> CoreResult<Page>;

    /// Counts stored entities of a type.
    fn count(&self, entity_type: EntityType) -> CoreResult<usize>;

    /// Allocates a fresh ID. IDs are ascending and never reused.
    fn next_id(&self, entity_type: EntityType) -> CoreResult<EntityId>;

    /// Applies the transaction's writes atomically.
    fn commit(&self, txn: &mut Transaction) -> CoreResult<()>;

    /// Discards the transaction's writes.
    fn rollback(&self, txn: &mut Transaction) -> CoreResult<()>;

    /// Checks that the store is reachable.
    fn ping(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Loads an entity as seen from inside a transaction.
    ///
    /// Pending writes win over stored state. Reads of stored state are
    /// noted among the transaction's observed versions.
    fn find_in(
        &self,
        txn: &mut Transaction,
        entity_type: EntityType,
        id: EntityId,
    ) -> CoreResult<Option<EntityRecord>> {
        txn.ensure_active()?;
        match txn.staged(entity_type, id) {
            Some(PendingWrite::Put { entity }) => return Ok(Some((**entity).clone())),
            Some(PendingWrite::Delete) => return Ok(None),
            None => {}
        }
        let found = self.find(entity_type, id)?;
        txn.observe(entity_type, id, found.as_ref().map(|e| e.version()));
        Ok(found)
    }
}

/// Repository operations that can be made to fail in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOp {
    /// [`EntityRepository::begin`].
    Begin,
    /// [`EntityRepository::find`].
    Find,
    /// [`EntityRepository::find_modified_since`].
    Query,
    /// [`EntityRepository::count`].
    Count,
    /// [`EntityRepository::commit`].
    Commit,
}

#[derive(Default)]
struct Tables {
    records: HashMap<EntityType, BTreeMap<EntityId, EntityRecord>>,
    next_ids: HashMap<EntityType, u64>,
}

/// In-memory entity repository.
///
/// Committed state lives behind a single `RwLock`. A commit checks the
/// transaction's observed versions and applies every pending write under
/// one write guard, so readers never observe half a batch.
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    next_txn: AtomicU64,
    available: AtomicBool,
    faults: Mutex<Vec<(RepoOp, CoreError)>>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_txn: AtomicU64::new(1),
            available: AtomicBool::new(true),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Stores an entity directly, outside any transaction.
    ///
    /// Assigns an ID if the entity has none. Returns the ID.
    pub fn seed(&self, mut entity: EntityRecord) -> EntityId {
        let entity_type = entity.entity_type();
        let mut tables = self.tables.write();
        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = Self::allocate(&mut tables, entity_type);
                entity.meta_mut().id = Some(id);
                id
            }
        };
        let next = tables.next_ids.entry(entity_type).or_insert(1);
        *next = (*next).max(id.as_u64() + 1);
        tables
            .records
            .entry(entity_type)
            .or_default()
            .insert(id, entity);
        id
    }

    /// Returns every stored entity of a type, ascending by ID.
    pub fn all(&self, entity_type: EntityType) -> Vec<EntityRecord> {
        self.tables
            .read()
            .records
            .get(&entity_type)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Marks the store reachable or unreachable.
    ///
    /// While unreachable every operation fails with `ConnectionLost`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: RepoOp, error: CoreError) {
        self.faults.lock().push((op, error));
    }

    fn check(&self, op: RepoOp) -> CoreResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CoreError::connection_lost("repository unavailable"));
        }
        let mut faults = self.faults.lock();
        if let Some(pos) = faults.iter().position(|(o, _)| *o == op) {
            let (_, error) = faults.remove(pos);
            return Err(error);
        }
        Ok(())
    }

    fn allocate(tables: &mut Tables, entity_type: EntityType) -> EntityId {
        let next = tables.next_ids.entry(entity_type).or_insert(1);
        let id = EntityId::new(*next);
        *next += 1;
        id
    }
}

impl EntityRepository for MemoryRepository {
    fn begin(&self) -> CoreResult<Transaction> {
        self.check(RepoOp::Begin)?;
        let id = self.next_txn.fetch_add(1, Ordering::SeqCst);
        Ok(Transaction::new(id))
    }

    fn find(&self, entity_type: EntityType, id: EntityId) -> CoreResult<Option<EntityRecord>> {
        self.check(RepoOp::Find)?;
        Ok(self
            .tables
            .read()
            .records
            .get(&entity_type)
            .and_then(|table| table.get(&id))
            .cloned())
    }

    fn find_modified_since(
        &self,
        entity_type: EntityType,
        since: Option<Timestamp>,
        after: Option<EntityId>,
        limit: usize,
    ) -> CoreResult<Page> {
        self.check(RepoOp::Query)?;
        let tables = self.tables.read();
        let Some(table) = tables.records.get(&entity_type) else {
            return Ok(Page {
                records: Vec::new(),
                total: 0,
            });
        };

        let matching = table
            .iter()
            .filter(|(id, _)| after.map_or(true, |after| **id > after))
            .filter(|(_, entity)| match since {
                None => true,
                Some(since) => entity.modified_at().is_some_and(|at| at > since),
            })
            .map(|(_, entity)| entity);

        let mut records = Vec::new();
        let mut total = 0;
        for entity in matching {
            if records.len() < limit {
                records.push(entity.clone());
            }
            total += 1;
        }
        Ok(Page { records, total })
    }

    fn count(&self, entity_type: EntityType) -> CoreResult<usize> {
        self.check(RepoOp::Count)?;
        Ok(self
            .tables
            .read()
            .records
            .get(&entity_type)
            .map_or(0, BTreeMap::len))
    }

    fn next_id(&self, entity_type: EntityType) -> CoreResult<EntityId> {
        let mut tables = self.tables.write();
        Ok(Self::allocate(&mut tables, entity_type))
    }

    fn commit(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.ensure_active()?;
        if let Err(err) = self.check(RepoOp::Commit) {
            txn.mark_aborted();
            return Err(err);
        }

        let mut tables = self.tables.write();
        let stale = txn
            .observed_versions()
            .find(|((entity_type, id), observed)| {
                let current = tables
                    .records
                    .get(entity_type)
                    .and_then(|table| table.get(id))
                    .map(|e| e.version());
                current != **observed
            })
            .map(|(key, _)| *key);
        if let Some((entity_type, id)) = stale {
            drop(tables);
            txn.mark_aborted();
            return Err(CoreError::TransactionConflict { entity_type, id });
        }

        let mut applied = 0;
        for ((entity_type, id), write) in txn.pending_writes() {
            let table = tables.records.entry(*entity_type).or_default();
            match write {
                PendingWrite::Put { entity } => {
                    table.insert(*id, (**entity).clone());
                }
                PendingWrite::Delete => {
                    table.remove(id);
                }
            }
            applied += 1;
        }
        drop(tables);

        debug!(txn = txn.id(), writes = applied, "transaction committed");
        txn.mark_committed();
        Ok(())
    }

    fn rollback(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.ensure_active()?;
        debug!(txn = txn.id(), writes = txn.write_count(), "transaction rolled back");
        txn.mark_aborted();
        Ok(())
    }

    fn ping(&self) -> CoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CoreError::connection_lost("repository unavailable"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Customer;
    use crmsync_protocol::parse_timestamp_str;

    fn customer(name: &str, updated: &str) -> EntityRecord {
        let mut entity = EntityRecord::Customer(Customer {
            name: name.into(),
            ..Customer::default()
        });
        entity.meta_mut().updated_at = parse_timestamp_str(updated);
        entity.meta_mut().version = 1;
        entity
    }

    #[test]
    fn seed_assigns_ascending_ids() {
        let repo = MemoryRepository::new();
        let a = repo.seed(customer("a", "2024-01-01T00:00:00Z"));
        let b = repo.seed(customer("b", "2024-01-01T00:00:00Z"));
        assert!(b > a);
        assert_eq!(repo.count(EntityType::Customer).unwrap(), 2);

        let next = repo.next_id(EntityType::Customer).unwrap();
        assert!(next > b);
    }

    #[test]
    fn commit_applies_all_writes() {
        let repo = MemoryRepository::new();
        let existing = repo.seed(customer("old", "2024-01-01T00:00:00Z"));

        let mut txn = repo.begin().unwrap();
        let id = repo.next_id(EntityType::Customer).unwrap();
        txn.put(EntityType::Customer, id, customer("new", "2024-01-02T00:00:00Z"))
            .unwrap();
        txn.delete(EntityType::Customer, existing).unwrap();

        assert_eq!(repo.count(EntityType::Customer).unwrap(), 1);
        repo.commit(&mut txn).unwrap();

        assert!(repo.find(EntityType::Customer, existing).unwrap().is_none());
        assert!(repo.find(EntityType::Customer, id).unwrap().is_some());
        assert!(!txn.is_active());
    }

    #[test]
    fn rollback_discards_writes() {
        let repo = MemoryRepository::new();
        let mut txn = repo.begin().unwrap();
        let id = repo.next_id(EntityType::Customer).unwrap();
        txn.put(EntityType::Customer, id, customer("x", "2024-01-01T00:00:00Z"))
            .unwrap();
        repo.rollback(&mut txn).unwrap();

        assert_eq!(repo.count(EntityType::Customer).unwrap(), 0);
        assert!(repo.commit(&mut txn).is_err());
    }

    #[test]
    fn find_in_sees_pending_writes() {
        let repo = MemoryRepository::new();
        let id = repo.seed(customer("a", "2024-01-01T00:00:00Z"));

        let mut txn = repo.begin().unwrap();
        txn.delete(EntityType::Customer, id).unwrap();
        assert!(repo.find_in(&mut txn, EntityType::Customer, id).unwrap().is_none());
        assert!(repo.find(EntityType::Customer, id).unwrap().is_some());
    }

    #[test]
    fn concurrent_modification_aborts_commit() {
        let repo = MemoryRepository::new();
        let id = repo.seed(customer("a", "2024-01-01T00:00:00Z"));

        let mut txn = repo.begin().unwrap();
        let mut entity = repo.find_in(&mut txn, EntityType::Customer, id).unwrap().unwrap();
        entity.meta_mut().version = 2;
        txn.put(EntityType::Customer, id, entity).unwrap();

        let mut other = customer("b", "2024-01-03T00:00:00Z");
        other.meta_mut().id = Some(id);
        other.meta_mut().version = 2;
        repo.seed(other);

        let err = repo.commit(&mut txn).unwrap_err();
        assert!(matches!(err, CoreError::TransactionConflict { .. }));
    }

    #[test]
    fn modified_since_filters_and_pages() {
        let repo = MemoryRepository::new();
        repo.seed(customer("a", "2024-01-01T00:00:00Z"));
        let b = repo.seed(customer("b", "2024-02-01T00:00:00Z"));
        repo.seed(customer("c", "2024-03-01T00:00:00Z"));
        repo.seed(customer("d", "2024-04-01T00:00:00Z"));

        let since = parse_timestamp_str("2024-01-15T00:00:00Z");
        let page = repo
            .find_modified_since(EntityType::Customer, since, None, 2)
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.records.len(), 2);
        assert!(page.has_more());
        assert_eq!(page.records[0].id(), Some(b));

        let last = page.records[1].id();
        let next = repo
            .find_modified_since(EntityType::Customer, since, last, 2)
            .unwrap();
        assert_eq!(next.records.len(), 1);
        assert!(!next.has_more());

        let all = repo
            .find_modified_since(EntityType::Customer, None, None, 100)
            .unwrap();
        assert_eq!(all.total, 4);
    }

    #[test]
    fn injected_faults_fire_once() {
        let repo = MemoryRepository::new();
        repo.fail_next(RepoOp::Count, CoreError::lock_timeout("busy"));
        assert!(matches!(
            repo.count(EntityType::Customer),
            Err(CoreError::LockTimeout { .. })
        ));
        assert!(repo.count(EntityType::Customer).is_ok());
    }

    #[test]
    fn unavailable_store_reports_connection_lost() {
        let repo = MemoryRepository::new();
        repo.set_available(false);
        assert!(matches!(repo.begin(), Err(CoreError::ConnectionLost { .. })));
        assert!(repo.ping().is_err());
        repo.set_available(true);
        assert!(repo.ping().is_ok());
    }
}
