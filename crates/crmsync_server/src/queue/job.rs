//! Execution of background sync jobs.

use super::message::SyncJob;
use crate::error::{ServerError, ServerResult};
use crate::orchestrator::SyncOrchestrator;
use crmsync_protocol::{PullResponse, PushResponse, ResolveConflictRequest, ResolveConflictResponse};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a job produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    /// Push result, if the job pushed in this attempt.
    pub push: Option<PushResponse>,
    /// Conflicts settled with the job's strategy.
    pub resolved: Vec<ResolveConflictResponse>,
    /// Conflicts left for a person to decide.
    pub unresolved: Vec<ResolveConflictRequest>,
    /// Pull result, if the job pulled.
    pub pull: Option<PullResponse>,
}

/// Runs one sync job.
///
/// Stages that committed are removed from `job`, so a retried message
/// resumes after them. Errors are classified with
/// [`Classify`](crmsync_protocol::Classify) to decide whether the job is
/// retried.
pub trait JobHandler: Send + Sync {
    /// Executes the job.
    fn handle(&self, job: &mut SyncJob) -> ServerResult<JobReport>;
}

/// Runs jobs against a local [`SyncOrchestrator`]: push, settle the
/// conflicts it reported, then pull.
pub struct OrchestratorJobHandler {
    orchestrator: Arc<SyncOrchestrator>,
}

impl OrchestratorJobHandler {
    /// Creates a handler.
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl JobHandler for OrchestratorJobHandler {
    fn handle(&self, job: &mut SyncJob) -> ServerResult<JobReport> {
        let mut report = JobReport::default();

        if let Some(request) = &job.push {
            let strategy = request.conflict_strategy;
            let response = self.orchestrator.push(request.clone())?;
            if !response.success {
                return Err(ServerError::BatchRejected(response.errors.len()));
            }
            // Committed: a retry must not apply these changes again.
            job.push = None;
            job.resolve.extend(response.conflicts.iter().map(|conflict| {
                let mut resolve = ResolveConflictRequest::from(conflict);
                resolve.resolution = strategy;
                resolve
            }));
            debug!(
                applied = response.results.len(),
                conflicts = response.conflicts.len(),
                "background push done"
            );
            report.push = Some(response);
        }

        let mut next = 0;
        while next < job.resolve.len() {
            if !job.resolve[next].resolution.auto_resolves() {
                next += 1;
                continue;
            }
            let response = self.orchestrator.resolve_conflict(job.resolve[next].clone())?;
            job.resolve.remove(next);
            report.resolved.push(response);
        }

        if let Some(request) = &job.pull {
            let response = self.orchestrator.pull(request)?;
            debug!(records = response.record_count(), "background pull done");
            report.pull = Some(response);
        }

        report.unresolved = std::mem::take(&mut job.resolve);
        if !report.unresolved.is_empty() {
            warn!(
                conflicts = report.unresolved.len(),
                "background job left conflicts for manual resolution"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use chrono::Utc;
    use crmsync_core::{CoreError, EntityRepository, MemoryRepository, RepoOp, Syncable};
    use crmsync_protocol::{
        Classify, ConflictStrategy, EntityId, EntityType, PullRequest, PushRequest,
        SyncOperation, SyncRecord,
    };
    use crmsync_testkit::{customer, update_customer};
    use serde_json::json;

    fn handler() -> (Arc<MemoryRepository>, OrchestratorJobHandler) {
        let repo = Arc::new(MemoryRepository::new());
        let orchestrator = Arc::new(SyncOrchestrator::new(repo.clone(), ServerConfig::default()));
        (repo, OrchestratorJobHandler::new(orchestrator))
    }

    fn create(name: &str) -> SyncOperation {
        let payload = SyncRecord::from_value(json!({"clientId": "c1", "name": name})).unwrap();
        SyncOperation::create(EntityType::Customer, payload, Utc::now())
    }

    #[test]
    fn push_then_pull() {
        let (_repo, handler) = handler();
        let mut job = SyncJob::push(PushRequest::new(vec![create("X")], ConflictStrategy::ServerWins))
            .then_pull(PullRequest::new(None, vec![EntityType::Customer]));

        let report = handler.handle(&mut job).unwrap();
        assert_eq!(report.push.unwrap().results.len(), 1);
        assert_eq!(report.pull.unwrap().record_count(), 1);
        assert!(job.push.is_none());
    }

    #[test]
    fn rejected_batch_is_permanent() {
        let (_repo, handler) = handler();
        let mut job = SyncJob::push(PushRequest::new(vec![create("")], ConflictStrategy::ServerWins));

        let err = handler.handle(&mut job).unwrap_err();
        assert!(matches!(err, ServerError::BatchRejected(1)));
        assert!(!err.class().is_transient());
        assert!(job.push.is_some());
    }

    #[test]
    fn lost_connection_is_transient() {
        let (repo, handler) = handler();
        repo.fail_next(RepoOp::Begin, CoreError::connection_lost("reset"));
        let mut job = SyncJob::push(PushRequest::new(vec![create("X")], ConflictStrategy::ServerWins));

        let err = handler.handle(&mut job).unwrap_err();
        assert!(err.class().is_transient());
        assert!(job.push.is_some());
    }

    #[test]
    fn failed_pull_leaves_only_the_pull() {
        let (repo, handler) = handler();
        repo.fail_next(RepoOp::Query, CoreError::connection_lost("reset"));
        let mut job = SyncJob::push(PushRequest::new(vec![create("X")], ConflictStrategy::ServerWins))
            .then_pull(PullRequest::new(None, vec![EntityType::Customer]));

        let err = handler.handle(&mut job).unwrap_err();
        assert!(err.class().is_transient());
        assert!(job.push.is_none());
        assert!(job.pull.is_some());
        assert_eq!(repo.all(EntityType::Customer).len(), 1);

        let report = handler.handle(&mut job).unwrap();
        assert!(report.push.is_none());
        assert_eq!(report.pull.unwrap().record_count(), 1);
        assert_eq!(repo.all(EntityType::Customer).len(), 1);
    }

    fn stale_update(repo: &MemoryRepository, strategy: ConflictStrategy) -> SyncJob {
        // Another client already moved customer 1 to version 2.
        repo.seed(customer(1, 2, "Server name"));
        SyncJob::push(PushRequest::new(
            vec![update_customer(1, 1, 1, "Client name")],
            strategy,
        ))
    }

    #[test]
    fn conflicts_are_settled_with_job_strategy() {
        let (repo, handler) = handler();
        let mut job = stale_update(&repo, ConflictStrategy::ClientWins);

        let report = handler.handle(&mut job).unwrap();
        assert_eq!(report.push.unwrap().conflicts.len(), 1);
        assert_eq!(report.resolved.len(), 1);
        assert!(report.unresolved.is_empty());

        let stored = repo.find(EntityType::Customer, EntityId::new(1)).unwrap().unwrap();
        assert_eq!(stored.to_fields().get("name"), Some(&json!("Client name")));
        assert_eq!(stored.version(), 3);
    }

    #[test]
    fn manual_conflicts_are_reported() {
        let (repo, handler) = handler();
        let mut job = stale_update(&repo, ConflictStrategy::Manual);

        let report = handler.handle(&mut job).unwrap();
        assert!(report.resolved.is_empty());
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].entity_id, EntityId::new(1));
        assert_eq!(report.unresolved[0].client_data.get("name"), Some(&json!("Client name")));
        assert!(job.resolve.is_empty());

        let stored = repo.find(EntityType::Customer, EntityId::new(1)).unwrap().unwrap();
        assert_eq!(stored.version(), 2);
    }
}
