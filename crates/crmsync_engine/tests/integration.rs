//! End-to-end sync cycles against the real server router.

use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::Router;
use crmsync_core::{EntityRepository, MemoryRepository, Syncable};
use crmsync_engine::{
    ChannelReviewer, ClientConfig, HttpMethod, HttpResponse, HttpTransport, LocalReplicaStore,
    LoopbackClient, LoopbackServer, MemoryReplicaStore, RecordKey, ReviewDecision, SyncClient,
    SyncError, SyncResult, SyncState, SyncTransport, TriggerOutcome,
};
use crmsync_protocol::{
    ConflictStrategy, EntityId, EntityType, HealthResponse, PullRequest, PullResponse,
    PushRequest, PushResponse, ResolveConflictRequest, ResolveConflictResponse, SyncRecord,
};
use crmsync_server::{ServerConfig, SyncServer};
use crmsync_testkit::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct RouterServer {
    router: Router,
}

impl LoopbackServer for RouterServer {
    async fn handle(&self, method: HttpMethod, path: &str, body: Vec<u8>) -> HttpResponse {
        let request = match method {
            HttpMethod::Get => Request::get(path).body(Body::empty()),
            HttpMethod::Post => Request::post(path)
                .header("content-type", "application/json")
                .body(Body::from(body)),
        }
        .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        HttpResponse::new(status, bytes.to_vec())
    }
}

type Transport = HttpTransport<LoopbackClient<RouterServer>>;
type Client = SyncClient<MemoryReplicaStore, Transport>;

struct Harness {
    repo: Arc<MemoryRepository>,
    server: SyncServer,
}

impl Harness {
    fn new(customers: u64) -> Self {
        let repo = seeded_repository(customers);
        let server = SyncServer::new(repo.clone(), ServerConfig::default());
        Self { repo, server }
    }

    fn transport(&self) -> Transport {
        HttpTransport::new(
            "http://sync.test",
            LoopbackClient::new(RouterServer {
                router: self.server.router(),
            }),
        )
    }

    fn client(&self, config: ClientConfig) -> Client {
        self.client_with_store(config, Arc::new(MemoryReplicaStore::new()))
    }

    fn client_with_store(&self, config: ClientConfig, store: Arc<MemoryReplicaStore>) -> Client {
        SyncClient::new(config, store, Arc::new(self.transport()))
    }
}

fn customers_only() -> ClientConfig {
    ClientConfig::new().with_entity_types(vec![EntityType::Customer])
}

#[tokio::test]
async fn created_record_gets_server_id() {
    let harness = Harness::new(0);
    let client = harness.client(customers_only());
    let client_id = client
        .store()
        .record_create(EntityType::Customer, record(json!({"name": "X"})))
        .unwrap();

    let outcome = client.sync_now().await;
    let report = outcome.report().unwrap();
    assert_eq!(report.applied, 1);
    assert!(report.checkpoint_advanced);

    let local = client
        .store()
        .find_by_client_id(EntityType::Customer, &client_id)
        .unwrap()
        .unwrap();
    let id = local.id().unwrap();
    assert_eq!(local.version(), 1);
    assert!(!local.is_dirty());
    assert_eq!(client.store().pending_count().unwrap(), 0);

    let stored = harness.repo.find(EntityType::Customer, id).unwrap().unwrap();
    assert_eq!(stored.client_id(), Some(client_id.as_str()));
}

#[tokio::test]
async fn large_queue_is_pushed_within_server_batch_limit() {
    let harness = Harness::new(0);
    let client = harness.client(customers_only());
    for n in 0..501 {
        client
            .store()
            .record_create(EntityType::Customer, record(json!({"name": format!("Customer {n}")})))
            .unwrap();
    }

    let outcome = client.sync_now().await;
    let report = outcome.report().unwrap();
    assert_eq!(report.pushed, 501);
    assert_eq!(report.applied, 501);
    assert_eq!(harness.repo.all(EntityType::Customer).len(), 501);
    assert_eq!(client.store().pending_count().unwrap(), 0);
    assert!(client.store().unsynced(EntityType::Customer).unwrap().is_empty());
}

/// Applies one local edit while a push is on the wire.
struct EditDuringPush {
    inner: Transport,
    store: Arc<MemoryReplicaStore>,
    edit: Mutex<Option<(String, SyncRecord)>>,
}

impl SyncTransport for EditDuringPush {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let edit = self.edit.lock().unwrap().take();
        if let Some((client_id, changes)) = edit {
            self.store
                .record_update(EntityType::Customer, &RecordKey::Client(client_id), changes)
                .unwrap();
        }
        self.inner.push(request).await
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.inner.pull(request).await
    }

    async fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        self.inner.resolve_conflict(request).await
    }

    async fn health(&self) -> SyncResult<HealthResponse> {
        self.inner.health().await
    }
}

#[tokio::test]
async fn edit_while_create_is_in_flight_makes_one_server_record() {
    let harness = Harness::new(0);
    let store = Arc::new(MemoryReplicaStore::new());
    let client_id = store
        .record_create(EntityType::Customer, record(json!({"name": "X"})))
        .unwrap();
    let transport = EditDuringPush {
        inner: harness.transport(),
        store: store.clone(),
        edit: Mutex::new(Some((client_id.clone(), record(json!({"name": "Y"}))))),
    };
    let client = SyncClient::new(customers_only(), store, Arc::new(transport));

    assert!(client.sync_now().await.is_completed());
    assert!(client.sync_now().await.is_completed());

    let stored = harness.repo.all(EntityType::Customer);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].client_id(), Some(client_id.as_str()));
    assert_eq!(stored[0].to_fields().get("name"), Some(&json!("Y")));
    assert_eq!(stored[0].version(), 2);

    let local = client
        .store()
        .find_by_client_id(EntityType::Customer, &client_id)
        .unwrap()
        .unwrap();
    assert_eq!(local.id(), stored[0].id());
    assert!(!local.is_dirty());
    assert_eq!(client.store().pending_count().unwrap(), 0);
}

#[tokio::test]
async fn quiet_cycle_moves_nothing() {
    let harness = Harness::new(3);
    let client = harness.client(customers_only());

    let first = client.sync_now().await;
    assert_eq!(first.report().unwrap().pulled, 3);
    let checkpoint = client.store().checkpoint().unwrap();

    let second = client.sync_now().await;
    let report = second.report().unwrap();
    assert_eq!(report.pushed, 0);
    assert_eq!(report.pulled, 0);
    assert!(client.store().checkpoint().unwrap() >= checkpoint);
    assert_eq!(client.store().records(EntityType::Customer).unwrap().len(), 3);
}

#[tokio::test]
async fn pages_are_exhausted_before_checkpoint_moves() {
    let harness = Harness::new(5);
    let client = harness.client(customers_only().with_page_size(2));

    let outcome = client.sync_now().await;
    let report = outcome.report().unwrap();
    assert_eq!(report.pages, 3);
    assert_eq!(report.pulled, 5);
    assert!(report.checkpoint_advanced);
    assert_eq!(client.store().records(EntityType::Customer).unwrap().len(), 5);
}

#[tokio::test]
async fn page_budget_blocks_checkpoint() {
    let harness = Harness::new(5);
    let client = harness.client(
        customers_only()
            .with_page_size(2)
            .with_max_pages_per_cycle(2),
    );

    let outcome = client.sync_now().await;
    let report = outcome.report().unwrap();
    assert_eq!(report.pages, 2);
    assert!(!report.checkpoint_advanced);
    assert_eq!(client.store().checkpoint().unwrap(), None);
    assert_eq!(client.store().records(EntityType::Customer).unwrap().len(), 4);
}

#[tokio::test]
async fn stale_update_is_merged() {
    let harness = Harness::new(1);
    let client = harness.client(customers_only().with_conflict_strategy(ConflictStrategy::Merge));
    client.sync_now().await;

    // Another client moves the record to version 2.
    harness
        .server
        .orchestrator()
        .push(PushRequest::new(
            vec![update_customer(1, 1, 1, "Server name")],
            ConflictStrategy::ServerWins,
        ))
        .unwrap();

    client
        .store()
        .record_update(
            EntityType::Customer,
            &RecordKey::Id(EntityId::new(1)),
            record(json!({"name": "Client name"})),
        )
        .unwrap();
    let outcome = client.sync_now().await;
    let report = outcome.report().unwrap();
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.resolved, 1);

    let local = client.store().get(EntityType::Customer, EntityId::new(1)).unwrap().unwrap();
    assert_eq!(local.version(), 3);
    assert_eq!(local.get("name"), Some(&json!("Client name")));
    assert!(!local.is_dirty());

    let stored = harness.repo.find(EntityType::Customer, EntityId::new(1)).unwrap().unwrap();
    assert_eq!(stored.version(), 3);
    assert_eq!(client.store().pending_count().unwrap(), 0);
}

#[tokio::test]
async fn reviewer_picks_server_side() {
    let harness = Harness::new(1);
    let (reviewer, mut inbox) = ChannelReviewer::new();
    let client = harness
        .client(customers_only().with_conflict_strategy(ConflictStrategy::Manual))
        .with_reviewer(Arc::new(reviewer));
    client.sync_now().await;

    harness
        .server
        .orchestrator()
        .push(PushRequest::new(
            vec![update_customer(1, 1, 1, "Server name")],
            ConflictStrategy::ServerWins,
        ))
        .unwrap();
    client
        .store()
        .record_update(
            EntityType::Customer,
            &RecordKey::Id(EntityId::new(1)),
            record(json!({"name": "Client name"})),
        )
        .unwrap();

    let review = async {
        let pending = inbox.recv().await.unwrap();
        assert_eq!(pending.request.conflict.server_version, 2);
        pending.decide(ReviewDecision::with_strategy(ConflictStrategy::ServerWins));
    };
    let (outcome, ()) = tokio::join!(client.sync_now(), review);
    assert_eq!(outcome.report().unwrap().resolved, 1);

    let local = client.store().get(EntityType::Customer, EntityId::new(1)).unwrap().unwrap();
    assert_eq!(local.get("name"), Some(&json!("Server name")));
    assert_eq!(local.version(), 3);
}

#[tokio::test]
async fn invalid_create_is_rejected_and_kept() {
    let harness = Harness::new(0);
    let client = harness.client(customers_only());
    client
        .store()
        .record_create(EntityType::Customer, record(json!({"name": ""})))
        .unwrap();

    let outcome = client.sync_now().await;
    assert!(matches!(
        outcome,
        TriggerOutcome::Failed(SyncError::Rejected { failed: 1 })
    ));
    let queue = client.store().pending_operations().unwrap();
    assert_eq!(queue[0].retry_count, 1);
    assert_eq!(harness.repo.count(EntityType::Customer).unwrap(), 0);
    assert_eq!(client.state(), SyncState::Idle);
}

#[tokio::test]
async fn local_delete_reaches_server() {
    let harness = Harness::new(2);
    let client = harness.client(customers_only());
    client.sync_now().await;

    client
        .store()
        .record_delete(EntityType::Customer, &RecordKey::Id(EntityId::new(2)))
        .unwrap();
    let outcome = client.sync_now().await;
    assert_eq!(outcome.report().unwrap().applied, 1);
    assert!(harness.repo.find(EntityType::Customer, EntityId::new(2)).unwrap().is_none());
    assert_eq!(client.store().records(EntityType::Customer).unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let harness = Harness::new(2);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replica.json");

    let client = harness.client(customers_only());
    client.sync_now().await;
    client
        .store()
        .record_create(EntityType::Customer, record(json!({"name": "Offline edit"})))
        .unwrap();
    client.store().save_to(&path).unwrap();
    let checkpoint = client.store().checkpoint().unwrap();
    drop(client);

    let store = Arc::new(MemoryReplicaStore::load_from(&path).unwrap());
    assert_eq!(store.checkpoint().unwrap(), checkpoint);
    assert_eq!(store.pending_count().unwrap(), 1);

    let client = harness.client_with_store(customers_only(), store);
    let outcome = client.sync_now().await;
    let report = outcome.report().unwrap();
    assert_eq!(report.applied, 1);
    // Only the record just created is newer than the saved checkpoint.
    assert_eq!(report.pulled, 1);
    assert_eq!(harness.repo.count(EntityType::Customer).unwrap(), 3);
}

#[tokio::test]
async fn health_over_http() {
    let harness = Harness::new(0);
    let transport = harness.transport();
    assert!(transport.health().await.unwrap().is_healthy());

    harness.repo.set_available(false);
    assert!(!transport.health().await.unwrap().is_healthy());

    let client = harness.client(customers_only());
    assert!(!client.check_connectivity().await);
    assert_eq!(client.state(), SyncState::Offline);
    assert!(matches!(client.sync_now().await, TriggerOutcome::Offline));
}
