//! Sync client state machine.
//!
//! One cycle pushes the pending queue, settles conflicts, then pulls
//! server changes page by page. A failed step aborts the rest of the
//! cycle; whatever was not confirmed stays queued and the checkpoint
//! stays put, so the next trigger starts from the same point.

use crate::config::ClientConfig;
use crate::error::{SyncError, SyncResult};
use crate::reviewer::{ConflictReviewer, ReviewDecision, ReviewRequest};
use crate::store::LocalReplicaStore;
use crate::transport::SyncTransport;
use chrono::Utc;
use crmsync_protocol::{
    ChangeResult, ChangeStatus, Conflict, EntityType, ManualResolution, PullRequest, PushRequest,
    ResolveConflictRequest, SyncOperation, SyncRecord, Timestamp,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// The current state of the sync client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Not syncing, connected.
    Idle,
    /// A cycle is in flight.
    Syncing,
    /// No connectivity; triggers are ignored.
    Offline,
}

/// What asked for a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Periodic timer tick.
    Timer,
    /// Explicit user request.
    Manual,
    /// Connectivity came back after the settle delay.
    ConnectivityRestored,
    /// The application regained focus.
    Refocus,
}

/// Result of a trigger.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A cycle ran to completion.
    Completed(CycleReport),
    /// A cycle ran and stopped at a failed step.
    Failed(SyncError),
    /// Another cycle was in flight; nothing was done.
    AlreadySyncing,
    /// The client is offline; nothing was done.
    Offline,
}

impl TriggerOutcome {
    /// Returns the report of a completed cycle.
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            TriggerOutcome::Completed(report) => Some(report),
            _ => None,
        }
    }

    /// Returns true if a cycle ran to completion.
    pub fn is_completed(&self) -> bool {
        matches!(self, TriggerOutcome::Completed(_))
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Operations sent.
    pub pushed: usize,
    /// Operations the server applied.
    pub applied: usize,
    /// Conflicts reported by the server.
    pub conflicts: usize,
    /// Conflicts resolved and written back.
    pub resolved: usize,
    /// Conflicts left for a later cycle.
    pub deferred: usize,
    /// Records pulled.
    pub pulled: usize,
    /// Pull pages fetched.
    pub pages: usize,
    /// Whether the checkpoint moved.
    pub checkpoint_advanced: bool,
}

/// Snapshot of the client for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Current state.
    pub state: SyncState,
    /// Queued operations.
    pub pending_count: usize,
    /// Pull checkpoint.
    pub last_sync_time: Option<Timestamp>,
    /// Error of the last failed cycle, cleared by a completed one.
    pub last_error: Option<String>,
    /// Cycles completed since start.
    pub cycles_completed: u64,
}

#[derive(Debug, Clone, Default)]
struct SyncStats {
    cycles_completed: u64,
    last_error: Option<String>,
}

/// Clears the syncing flag when a cycle ends, however it ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl<'a> SyncingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives sync cycles between a local replica and the server.
pub struct SyncClient<S: LocalReplicaStore, T: SyncTransport> {
    config: ClientConfig,
    store: Arc<S>,
    transport: Arc<T>,
    reviewer: Option<Arc<dyn ConflictReviewer>>,
    syncing: AtomicBool,
    online: AtomicBool,
    stats: RwLock<SyncStats>,
}

impl<S: LocalReplicaStore, T: SyncTransport> SyncClient<S, T> {
    /// Creates a client. It starts online and idle.
    pub fn new(config: ClientConfig, store: Arc<S>, transport: Arc<T>) -> Self {
        Self {
            config,
            store,
            transport,
            reviewer: None,
            syncing: AtomicBool::new(false),
            online: AtomicBool::new(true),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Sets the reviewer consulted under the `manual` strategy. Without
    /// one, manual conflicts are deferred.
    pub fn with_reviewer(mut self, reviewer: Arc<dyn ConflictReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else if !self.is_online() {
            SyncState::Offline
        } else {
            SyncState::Idle
        }
    }

    /// Returns a status snapshot.
    pub fn status(&self) -> SyncResult<SyncStatus> {
        let stats = self.stats.read().clone();
        Ok(SyncStatus {
            state: self.state(),
            pending_count: self.store.pending_count()?,
            last_sync_time: self.store.checkpoint()?,
            last_error: stats.last_error,
            cycles_completed: stats.cycles_completed,
        })
    }

    /// Returns true unless connectivity was reported lost.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Records that connectivity was lost.
    pub fn connectivity_lost(&self) {
        if self.online.swap(false, Ordering::AcqRel) {
            info!("connectivity lost, sync paused");
        }
    }

    /// Records that connectivity is back, waits the settle delay and then
    /// syncs if the connection held.
    pub async fn connectivity_restored(&self) -> TriggerOutcome {
        if !self.online.swap(true, Ordering::AcqRel) {
            info!(settle_ms = self.config.settle_delay.as_millis() as u64, "connectivity restored");
        }
        tokio::time::sleep(self.config.settle_delay).await;
        if !self.is_online() {
            debug!("connection dropped again during settle delay");
            return TriggerOutcome::Offline;
        }
        self.trigger(TriggerReason::ConnectivityRestored).await
    }

    /// Probes the server and updates the online flag. Returns the new flag.
    pub async fn check_connectivity(&self) -> bool {
        let healthy = match self.transport.health().await {
            Ok(health) => health.is_healthy(),
            Err(err) => {
                debug!(error = %err, "health probe failed");
                false
            }
        };
        if healthy {
            self.online.store(true, Ordering::Release);
        } else {
            self.connectivity_lost();
        }
        healthy
    }

    /// Runs a cycle unless one is in flight or the client is offline.
    ///
    /// Never blocks on another cycle: a trigger during a cycle returns
    /// [`TriggerOutcome::AlreadySyncing`] and is not queued.
    pub async fn trigger(&self, reason: TriggerReason) -> TriggerOutcome {
        if !self.is_online() {
            debug!(?reason, "sync skipped while offline");
            return TriggerOutcome::Offline;
        }
        let Some(_guard) = SyncingGuard::acquire(&self.syncing) else {
            debug!(?reason, "sync already in progress");
            return TriggerOutcome::AlreadySyncing;
        };

        debug!(?reason, "sync cycle started");
        let started = Instant::now();
        match self.run_cycle().await {
            Ok(report) => {
                {
                    let mut stats = self.stats.write();
                    stats.cycles_completed += 1;
                    stats.last_error = None;
                }
                info!(
                    ?reason,
                    pushed = report.pushed,
                    applied = report.applied,
                    conflicts = report.conflicts,
                    pulled = report.pulled,
                    pages = report.pages,
                    checkpoint_advanced = report.checkpoint_advanced,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "sync cycle completed"
                );
                TriggerOutcome::Completed(report)
            }
            Err(err) => {
                warn!(?reason, error = %err, "sync cycle failed, retrying on next trigger");
                self.stats.write().last_error = Some(err.to_string());
                TriggerOutcome::Failed(err)
            }
        }
    }

    /// Triggers a sync on user request.
    pub async fn sync_now(&self) -> TriggerOutcome {
        self.trigger(TriggerReason::Manual).await
    }

    /// Triggers a sync on every timer tick until `shutdown` flips to true.
    /// The first tick fires immediately. Returns the completed cycle count.
    pub async fn run_periodic(&self, mut shutdown: watch::Receiver<bool>) -> u64 {
        let period = self.config.sync_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut completed = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if self.trigger(TriggerReason::Timer).await.is_completed() {
                        completed += 1;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(completed, "periodic sync stopped");
        completed
    }

    async fn run_cycle(&self) -> SyncResult<CycleReport> {
        let mut report = CycleReport::default();
        self.push_pending(&mut report).await?;
        self.pull_all(&mut report).await?;
        Ok(report)
    }

    /// Pushes the queue in batches of at most `max_push_batch`.
    ///
    /// The queue is read again before each batch, so operations withdrawn
    /// meanwhile are not sent and updates bound by an earlier batch's
    /// creates go out in the same cycle. Each operation is sent at most once
    /// per cycle.
    async fn push_pending(&self, report: &mut CycleReport) -> SyncResult<()> {
        self.bind_settled_creates()?;
        let mut attempted = HashSet::new();

        loop {
            let chunk: Vec<u64> = self
                .store
                .pending_operations()?
                .iter()
                .filter(|op| !op.is_unbound() && !attempted.contains(&op.op_id))
                .take(self.config.max_push_batch)
                .map(|op| op.op_id)
                .collect();
            if chunk.is_empty() {
                return Ok(());
            }
            attempted.extend(chunk.iter().copied());

            let batch = self.store.mark_in_flight(&chunk)?;
            let outcome = if batch.is_empty() {
                Ok(Vec::new())
            } else {
                self.push_batch(batch, report).await
            };
            self.store.clear_in_flight()?;

            let conflicts = outcome?;
            self.settle_conflicts(&conflicts, report).await?;
        }
    }

    async fn push_batch(
        &self,
        batch: Vec<SyncOperation>,
        report: &mut CycleReport,
    ) -> SyncResult<Vec<Conflict>> {
        let op_ids: Vec<u64> = batch.iter().map(|op| op.op_id).collect();
        report.pushed += batch.len();

        let request =
            PushRequest::new(batch, self.config.conflict_strategy).with_client_time(Utc::now());
        let response = self.transport.push(&request).await?;

        if !response.success {
            self.store.increment_retry(&op_ids)?;
            let failed = response.errors.len();
            warn!(
                failed,
                error = response.error.as_deref().unwrap_or_default(),
                "push rejected, operations kept"
            );
            return Err(SyncError::Rejected { failed });
        }

        let applied: Vec<u64> = response.results.iter().map(|r| r.op_id).collect();
        self.store.remove_operations(&applied)?;
        self.apply_results(&response.results, response.server_time)?;
        report.applied += response.results.len();
        report.conflicts += response.conflicts.len();
        debug!(sent = op_ids.len(), applied = applied.len(), "push batch acknowledged");
        Ok(response.conflicts)
    }

    /// Binds queued edits whose create was confirmed in an earlier session.
    fn bind_settled_creates(&self) -> SyncResult<()> {
        for op in self.store.pending_operations()?.iter().filter(|op| op.is_unbound()) {
            let Some(client_id) = op.correlation_id() else {
                continue;
            };
            let Some(local) = self.store.find_by_client_id(op.entity_type, client_id)? else {
                continue;
            };
            if let Some(id) = local.id() {
                self.store
                    .bind_pending(op.entity_type, client_id, id, local.version())?;
            }
        }
        Ok(())
    }

    fn apply_results(&self, results: &[ChangeResult], at: Timestamp) -> SyncResult<()> {
        for result in results {
            let local = match result.status {
                ChangeStatus::Created => match result.client_id.as_deref() {
                    Some(client_id) => {
                        self.store
                            .bind_pending(result.entity, client_id, result.id, result.version)?;
                        self.store.find_by_client_id(result.entity, client_id)?
                    }
                    None => None,
                },
                ChangeStatus::Updated => self.store.get(result.entity, result.id)?,
                ChangeStatus::Deleted | ChangeStatus::AlreadyDeleted => continue,
            };
            let Some(mut record) = local else {
                debug!(entity = %result.entity, id = %result.id, "applied record no longer held locally");
                continue;
            };
            record.set_id(result.id);
            record.set_version(result.version);
            self.confirm(result.entity, record, at)?;
        }
        Ok(())
    }

    /// Writes a server-confirmed record, leaving it dirty if further local
    /// changes are still queued for it.
    fn confirm(&self, entity_type: EntityType, record: SyncRecord, at: Timestamp) -> SyncResult<()> {
        if self.has_pending(entity_type, &record)? {
            self.store.put(entity_type, record)
        } else {
            self.store.put_synced(entity_type, record, at)
        }
    }

    fn has_pending(&self, entity_type: EntityType, record: &SyncRecord) -> SyncResult<bool> {
        let id = record.id();
        let client_id = record.client_id();
        Ok(self.store.pending_operations()?.iter().any(|op| {
            op.entity_type == entity_type
                && ((id.is_some() && op.target_id() == id)
                    || (client_id.is_some() && op.correlation_id() == client_id))
        }))
    }

    async fn settle_conflicts(&self, conflicts: &[Conflict], report: &mut CycleReport) -> SyncResult<()> {
        let strategy = self.config.conflict_strategy;
        for conflict in conflicts {
            let decision = if strategy.auto_resolves() {
                Some(ReviewDecision::with_strategy(strategy))
            } else {
                self.request_review(conflict).await
            };
            let Some(decision) = decision.filter(|d| d.strategy.auto_resolves()) else {
                info!(
                    entity = %conflict.entity_type,
                    id = %conflict.entity_id,
                    "conflict deferred to a later cycle"
                );
                report.deferred += 1;
                continue;
            };

            let mut request = ResolveConflictRequest::from(conflict);
            request.resolution = decision.strategy;
            if let Some(values) = decision.client_data {
                request.client_data = values;
            }
            let response = self.transport.resolve_conflict(&request).await?;
            let Some(mut record) = response.entity else {
                report.deferred += 1;
                continue;
            };
            if record.client_id().is_none() {
                if let Some(client_id) = conflict.client_data.client_id() {
                    record.set_client_id(client_id);
                }
            }
            if !response.validation_errors.is_empty() {
                warn!(
                    entity = %conflict.entity_type,
                    id = %conflict.entity_id,
                    errors = ?response.validation_errors,
                    "resolved record has validation errors"
                );
            }

            self.store.remove_operations(&[conflict.op_id])?;
            self.confirm(conflict.entity_type, record, Utc::now())?;
            report.resolved += 1;
            debug!(
                entity = %conflict.entity_type,
                id = %conflict.entity_id,
                strategy = %response.resolution_applied,
                "conflict resolved"
            );
        }
        Ok(())
    }

    async fn request_review(&self, conflict: &Conflict) -> Option<ReviewDecision> {
        let reviewer = self.reviewer.as_ref()?;
        let manual = ManualResolution::new(&conflict.server_data, &conflict.client_data);
        let decision = reviewer.review(ReviewRequest {
            conflict: conflict.clone(),
            manual,
        });
        decision.await.ok()
    }

    async fn pull_all(&self, report: &mut CycleReport) -> SyncResult<()> {
        let since = self.store.checkpoint()?;
        let mut request = PullRequest::new(since, self.config.entity_types.clone())
            .with_limit(self.config.page_size);
        // The first page's clock is the only safe checkpoint for the loop:
        // later pages may skip records written between requests.
        let mut checkpoint = None;

        loop {
            let page = self.transport.pull(&request).await?;
            report.pages += 1;
            checkpoint.get_or_insert(page.server_time);

            for (entity_type, records) in &page.data {
                for record in records {
                    self.store.put_synced(*entity_type, record.clone(), page.server_time)?;
                }
            }
            report.pulled += page.record_count();

            let remaining: Vec<EntityType> = page
                .has_more
                .iter()
                .filter(|(_, more)| **more)
                .map(|(entity_type, _)| *entity_type)
                .collect();
            if remaining.is_empty() {
                break;
            }
            if report.pages >= self.config.max_pages_per_cycle {
                warn!(
                    pages = report.pages,
                    remaining = remaining.len(),
                    "page budget spent, checkpoint kept"
                );
                return Ok(());
            }

            let mut next = PullRequest::new(since, remaining.clone()).with_limit(self.config.page_size);
            for entity_type in remaining {
                let cursor = page
                    .last_id(entity_type)
                    .or_else(|| request.after.get(&entity_type).copied());
                if let Some(id) = cursor {
                    next = next.with_after(entity_type, id);
                }
            }
            request = next;
        }

        if let Some(at) = checkpoint {
            self.store.set_checkpoint(at)?;
            report.checkpoint_advanced = true;
        }
        Ok(())
    }
}
