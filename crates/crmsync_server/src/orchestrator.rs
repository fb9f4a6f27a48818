//! Sync orchestrator.
//!
//! Server-side coordinator for one sync round-trip: applies a batch of
//! client changes inside a single transaction, detects version conflicts,
//! serves pulls since a checkpoint and persists conflict resolutions.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use chrono::Utc;
use crmsync_core::{CoreError, CoreResult, EntityRecord, EntityRepository, Syncable, Transaction};
use crmsync_protocol::resolver::{self, ResolveOutcome};
use crmsync_protocol::{
    ChangeError, ChangeErrorKind, ChangeResult, ChangeStatus, ChangesResponse, Conflict,
    EntityId, EntityType, HealthResponse, OperationKind, PullRequest, PullResponse, PushRequest,
    PushResponse, ResolveConflictRequest, ResolveConflictResponse, StatusResponse, SyncOperation,
    SyncRecord, Timestamp,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one change inside a push.
enum ChangeOutcome {
    Applied(ChangeResult),
    Conflict(Conflict),
}

/// The sync orchestrator.
///
/// Pushes hold an exclusive batch guard from first read to commit; pulls
/// take the shared side while reading the clock and querying. A pull
/// therefore never reports a `serverTime` later than a write it cannot see.
pub struct SyncOrchestrator {
    repo: Arc<dyn EntityRepository>,
    config: ServerConfig,
    batch_guard: RwLock<()>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over a repository.
    pub fn new(repo: Arc<dyn EntityRepository>, config: ServerConfig) -> Self {
        Self {
            repo,
            config,
            batch_guard: RwLock::new(()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the repository.
    pub fn repository(&self) -> &Arc<dyn EntityRepository> {
        &self.repo
    }

    /// Applies a batch of client changes.
    ///
    /// Conflicts are reported and do not block the rest of the batch.
    /// Per-change errors are collected; if any occurred the whole batch is
    /// rolled back and the response lists them with `success: false`.
    /// Infrastructure failures abort immediately and surface as `Err`,
    /// with nothing applied.
    pub fn push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        let size = request.changes.len();
        if size > self.config.max_push_batch {
            return Err(ServerError::BatchTooLarge {
                size,
                max: self.config.max_push_batch,
            });
        }

        let _batch = self.batch_guard.write();
        let now = Utc::now();
        debug!(
            changes = size,
            strategy = %request.conflict_strategy,
            "processing push batch"
        );

        let mut txn = self.repo.begin()?;
        let mut results = Vec::new();
        let mut conflicts = Vec::new();
        let mut errors = Vec::new();

        for change in &request.changes {
            match self.apply_change(&mut txn, change, now) {
                Ok(ChangeOutcome::Applied(result)) => results.push(result),
                Ok(ChangeOutcome::Conflict(conflict)) => {
                    warn!(
                        entity = %conflict.entity_type,
                        id = %conflict.entity_id,
                        client_version = conflict.client_version,
                        server_version = conflict.server_version,
                        "version conflict"
                    );
                    conflicts.push(conflict);
                }
                Err(err) if err.is_per_change() => {
                    debug!(op_id = change.op_id, error = %err, "change rejected");
                    errors.push(ChangeError {
                        kind: error_kind(&err),
                        message: err.to_string(),
                        change: change.clone(),
                    });
                }
                Err(err) => {
                    error!(error = %err, "push batch aborted");
                    self.abandon(&mut txn);
                    return Err(err.into());
                }
            }
        }

        if !errors.is_empty() {
            self.abandon(&mut txn);
            info!(
                changes = size,
                errors = errors.len(),
                "push batch rolled back"
            );
            return Ok(PushResponse::rejected(errors, now));
        }

        self.repo.commit(&mut txn).map_err(|err| {
            error!(error = %err, "push commit failed");
            ServerError::from(err)
        })?;

        info!(
            applied = results.len(),
            conflicts = conflicts.len(),
            "push batch committed"
        );
        Ok(PushResponse::committed(results, conflicts, now))
    }

    fn apply_change(
        &self,
        txn: &mut Transaction,
        change: &SyncOperation,
        now: Timestamp,
    ) -> CoreResult<ChangeOutcome> {
        match change.operation {
            OperationKind::Create => self.apply_create(txn, change, now),
            OperationKind::Update => self.apply_update(txn, change, now),
            OperationKind::Delete => self.apply_delete(txn, change),
        }
    }

    fn apply_create(
        &self,
        txn: &mut Transaction,
        change: &SyncOperation,
        now: Timestamp,
    ) -> CoreResult<ChangeOutcome> {
        let entity_type = change.entity_type;
        let mut entity = EntityRecord::from_fields(entity_type, &change.payload)?;
        entity.validate()?;

        let id = self.repo.next_id(entity_type)?;
        let client_id = change.correlation_id().map(str::to_string);
        let meta = entity.meta_mut();
        meta.id = Some(id);
        meta.client_id = client_id.clone();
        meta.version = 1;
        meta.created_at = Some(now);
        meta.updated_at = Some(now);
        meta.last_synced_at = Some(now);
        txn.put(entity_type, id, entity)?;

        debug!(entity = %entity_type, %id, client_id = ?client_id, "created");
        Ok(ChangeOutcome::Applied(ChangeResult {
            op_id: change.op_id,
            operation: OperationKind::Create,
            entity: entity_type,
            id,
            client_id,
            status: ChangeStatus::Created,
            version: 1,
        }))
    }

    fn apply_update(
        &self,
        txn: &mut Transaction,
        change: &SyncOperation,
        now: Timestamp,
    ) -> CoreResult<ChangeOutcome> {
        let entity_type = change.entity_type;
        let id = change
            .target_id()
            .ok_or_else(|| CoreError::invalid_operation("update without an id"))?;
        let mut entity = self
            .repo
            .find_in(txn, entity_type, id)?
            .ok_or_else(|| CoreError::not_found(entity_type, id))?;

        let server_version = entity.version();
        let client_version = change.payload.version();
        if server_version > client_version {
            let conflict = Conflict::new(
                entity_type,
                id,
                change.payload.clone(),
                entity.to_fields(),
            )
            .with_op_id(change.op_id);
            return Ok(ChangeOutcome::Conflict(conflict));
        }

        entity.apply_fields(&change.payload)?;
        entity.validate()?;
        let version = server_version + 1;
        let meta = entity.meta_mut();
        meta.version = version;
        meta.updated_at = Some(now);
        meta.last_synced_at = Some(now);
        let client_id = entity.client_id().map(str::to_string);
        txn.put(entity_type, id, entity)?;

        debug!(entity = %entity_type, %id, version, "updated");
        Ok(ChangeOutcome::Applied(ChangeResult {
            op_id: change.op_id,
            operation: OperationKind::Update,
            entity: entity_type,
            id,
            client_id,
            status: ChangeStatus::Updated,
            version,
        }))
    }

    fn apply_delete(
        &self,
        txn: &mut Transaction,
        change: &SyncOperation,
    ) -> CoreResult<ChangeOutcome> {
        let entity_type = change.entity_type;
        let id = change
            .target_id()
            .ok_or_else(|| CoreError::invalid_operation("delete without an id"))?;

        let status = match self.repo.find_in(txn, entity_type, id)? {
            Some(_) => {
                txn.delete(entity_type, id)?;
                ChangeStatus::Deleted
            }
            None => ChangeStatus::AlreadyDeleted,
        };

        debug!(entity = %entity_type, %id, ?status, "deleted");
        Ok(ChangeOutcome::Applied(ChangeResult {
            op_id: change.op_id,
            operation: OperationKind::Delete,
            entity: entity_type,
            id,
            client_id: change.correlation_id().map(str::to_string),
            status,
            version: 0,
        }))
    }

    fn abandon(&self, txn: &mut Transaction) {
        if let Err(err) = self.repo.rollback(txn) {
            warn!(error = %err, "rollback failed");
        }
    }

    /// Returns records changed since the request's checkpoint.
    ///
    /// Each requested type is paged independently, ascending by ID, with
    /// `hasMore` set when records remain beyond the page.
    pub fn pull(&self, request: &PullRequest) -> ServerResult<PullResponse> {
        let limit = self.config.pull_limit(request.limit);
        let _batch = self.batch_guard.read();
        let server_time = Utc::now();

        let mut data = BTreeMap::new();
        let mut has_more = BTreeMap::new();
        for entity_type in request.entity_types() {
            let after = request.after.get(&entity_type).copied();
            let page = self
                .repo
                .find_modified_since(entity_type, request.since, after, limit)?;
            has_more.insert(entity_type, page.has_more());
            data.insert(
                entity_type,
                page.records.iter().map(Syncable::to_fields).collect(),
            );
        }

        let response = PullResponse {
            success: true,
            data,
            has_more,
            server_time,
        };
        debug!(
            records = response.record_count(),
            has_more = response.any_has_more(),
            "pull served"
        );
        Ok(response)
    }

    /// Returns every record changed since `since`, without paging.
    pub fn changes(
        &self,
        since: Option<Timestamp>,
        entities: &[EntityType],
    ) -> ServerResult<ChangesResponse> {
        let _batch = self.batch_guard.read();
        let server_time = Utc::now();
        let entities = if entities.is_empty() {
            &EntityType::ALL[..]
        } else {
            entities
        };

        let mut changes = BTreeMap::new();
        for &entity_type in entities {
            let page = self
                .repo
                .find_modified_since(entity_type, since, None, usize::MAX)?;
            changes.insert(
                entity_type,
                page.records.iter().map(Syncable::to_fields).collect(),
            );
        }

        Ok(ChangesResponse {
            success: true,
            changes,
            server_time,
        })
    }

    /// Resolves a conflict and persists the result.
    ///
    /// The persisted version is the stored version plus one and the record
    /// is marked synced. A `manual` resolution persists nothing and returns
    /// the review payload instead.
    pub fn resolve_conflict(
        &self,
        request: ResolveConflictRequest,
    ) -> ServerResult<ResolveConflictResponse> {
        let entity_type = request.entity;
        let id = request.entity_id;

        let resolved = match resolver::resolve(
            &request.server_data,
            &request.client_data,
            request.resolution,
        ) {
            ResolveOutcome::Manual(manual) => {
                info!(entity = %entity_type, %id, "conflict deferred to manual review");
                return Ok(ResolveConflictResponse {
                    success: true,
                    entity: None,
                    resolution_applied: request.resolution,
                    validation_errors: Vec::new(),
                    manual: Some(manual),
                });
            }
            ResolveOutcome::Resolved(resolved) => resolved,
        };

        if !resolved.is_valid() {
            warn!(
                entity = %entity_type,
                %id,
                errors = ?resolved.validation_errors,
                "resolved record has validation errors"
            );
        }

        let _batch = self.batch_guard.write();
        let now = Utc::now();
        let mut txn = self.repo.begin()?;
        let persisted = match self.persist_resolution(&mut txn, entity_type, id, &resolved.record, now) {
            Ok(persisted) => persisted,
            Err(err) => {
                self.abandon(&mut txn);
                return Err(err.into());
            }
        };
        self.repo.commit(&mut txn)?;

        let mut record = persisted.to_fields();
        record.mark_synced(now);
        info!(
            entity = %entity_type,
            %id,
            strategy = %resolved.strategy,
            version = persisted.version(),
            "conflict resolved"
        );

        Ok(ResolveConflictResponse {
            success: true,
            entity: Some(record),
            resolution_applied: resolved.strategy,
            validation_errors: resolved.validation_errors,
            manual: None,
        })
    }

    fn persist_resolution(
        &self,
        txn: &mut Transaction,
        entity_type: EntityType,
        id: EntityId,
        resolved: &SyncRecord,
        now: Timestamp,
    ) -> CoreResult<EntityRecord> {
        let mut entity = self
            .repo
            .find_in(txn, entity_type, id)?
            .ok_or_else(|| CoreError::not_found(entity_type, id))?;

        entity.apply_fields(resolved)?;
        let meta = entity.meta_mut();
        meta.version += 1;
        meta.updated_at = Some(now);
        meta.last_synced_at = Some(now);
        if meta.client_id.is_none() {
            meta.client_id = resolved.client_id().map(str::to_string);
        }
        txn.put(entity_type, id, entity.clone())?;
        Ok(entity)
    }

    /// Reports record counts and store reachability.
    pub fn status(&self) -> StatusResponse {
        let sync_available = self.repo.ping().is_ok();
        let entity_counts = EntityType::ALL
            .iter()
            .filter_map(|&entity_type| match self.repo.count(entity_type) {
                Ok(count) => Some((entity_type, count)),
                Err(err) => {
                    warn!(entity = %entity_type, error = %err, "count failed");
                    None
                }
            })
            .collect();

        StatusResponse {
            server_time: Utc::now(),
            entity_counts,
            sync_available,
        }
    }

    /// Health probe.
    pub fn health(&self) -> HealthResponse {
        HealthResponse::new(self.repo.ping().is_ok(), Utc::now())
    }
}

fn error_kind(err: &CoreError) -> ChangeErrorKind {
    match err {
        CoreError::NotFound { .. } => ChangeErrorKind::NotFound,
        CoreError::Validation { .. } => ChangeErrorKind::Validation,
        CoreError::TypeMismatch { .. } => ChangeErrorKind::TypeMismatch,
        _ => ChangeErrorKind::Invalid,
    }
}
