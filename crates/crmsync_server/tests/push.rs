//! Push semantics against the in-memory repository.

use crmsync_core::{CoreError, EntityRepository, RepoOp, Syncable};
use crmsync_protocol::{ChangeStatus, ConflictStrategy, EntityId, EntityType, PushRequest};
use crmsync_server::{ServerConfig, ServerError, SyncOrchestrator};
use crmsync_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::Arc;

fn orchestrator(repo: Arc<crmsync_core::MemoryRepository>) -> SyncOrchestrator {
    SyncOrchestrator::new(repo, ServerConfig::default())
}

fn stored_version(repo: &crmsync_core::MemoryRepository, id: u64) -> u64 {
    repo.find(EntityType::Customer, EntityId::new(id))
        .unwrap()
        .map(|entity| entity.version())
        .unwrap_or(0)
}

#[test]
fn batch_fatal_error_leaves_nothing_applied() {
    let repo = seeded_repository(2);
    let sync = orchestrator(repo.clone());
    repo.fail_next(RepoOp::Commit, CoreError::connection_lost("reset"));

    let err = sync
        .push(PushRequest::new(
            vec![
                update_customer(1, 1, 1, "Changed"),
                create_customer(2, "c9", "New"),
                delete(3, EntityType::Customer, 2),
            ],
            ConflictStrategy::ServerWins,
        ))
        .unwrap_err();

    assert!(matches!(err, ServerError::Core(CoreError::ConnectionLost { .. })));
    assert_eq!(repo.count(EntityType::Customer).unwrap(), 2);
    assert_eq!(stored_version(&repo, 1), 1);
}

#[test]
fn conflicts_alone_still_commit() {
    let repo = seeded_repository(2);
    let sync = orchestrator(repo.clone());
    sync.push(PushRequest::new(
        vec![update_customer(1, 1, 1, "Bumped")],
        ConflictStrategy::ServerWins,
    ))
    .unwrap();

    let response = sync
        .push(PushRequest::new(
            vec![update_customer(7, 1, 1, "Stale"), update_customer(8, 2, 1, "Fresh")],
            ConflictStrategy::ServerWins,
        ))
        .unwrap();

    assert!(response.success);
    assert_eq!(response.conflicts.len(), 1);
    assert_eq!(response.conflicts[0].op_id, 7);
    assert_eq!(response.results[0].op_id, 8);
    assert_eq!(response.results[0].status, ChangeStatus::Updated);
    assert_eq!(stored_version(&repo, 1), 2);
    assert_eq!(stored_version(&repo, 2), 2);
}

#[test]
fn empty_push_succeeds() {
    let repo = seeded_repository(1);
    let sync = orchestrator(repo);
    let response = sync
        .push(PushRequest::new(vec![], ConflictStrategy::Merge))
        .unwrap();
    assert!(response.success);
    assert!(response.results.is_empty());
}

#[test]
fn same_create_twice_is_not_deduplicated() {
    let repo = seeded_repository(0);
    let sync = orchestrator(repo.clone());
    for _ in 0..2 {
        sync.push(PushRequest::new(
            vec![create_customer(1, "c1", "X")],
            ConflictStrategy::ServerWins,
        ))
        .unwrap();
    }
    assert_eq!(repo.count(EntityType::Customer).unwrap(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn conflict_boundary(server_version in 1u64..20, client_version in 0u64..25) {
        let repo = seeded_repository(0);
        repo.seed(customer(1, server_version, "Acme"));
        let sync = orchestrator(repo.clone());

        let response = sync
            .push(PushRequest::new(
                vec![update_customer(1, 1, client_version, "Acme Corp")],
                ConflictStrategy::ServerWins,
            ))
            .unwrap();

        prop_assert!(response.success);
        if client_version < server_version {
            prop_assert_eq!(response.conflicts.len(), 1);
            prop_assert!(response.results.is_empty());
            prop_assert_eq!(stored_version(&repo, 1), server_version);
        } else {
            prop_assert!(response.conflicts.is_empty());
            prop_assert_eq!(response.results[0].version, server_version + 1);
            prop_assert_eq!(stored_version(&repo, 1), server_version + 1);
        }
    }

    #[test]
    fn versions_never_decrease(edits in prop::collection::vec(0u64..6, 1..12)) {
        let repo = seeded_repository(1);
        let sync = orchestrator(repo.clone());

        for (op_id, edited_at) in edits.into_iter().enumerate() {
            let before = stored_version(&repo, 1);
            let response = sync
                .push(PushRequest::new(
                    vec![update_customer(op_id as u64, 1, edited_at, "Edit")],
                    ConflictStrategy::ServerWins,
                ))
                .unwrap();
            let after = stored_version(&repo, 1);

            prop_assert!(after >= before);
            if response.results.is_empty() {
                prop_assert_eq!(after, before);
            } else {
                prop_assert_eq!(after, before + 1);
            }
        }
    }
}
