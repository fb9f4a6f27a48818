//! HTTP endpoint tests driven through the router.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use crmsync_protocol::{
    ChangesResponse, ConflictStrategy, EntityType, HealthResponse, PullResponse, PushRequest,
    PushResponse, ResolveConflictRequest, ResolveConflictResponse, StatusResponse,
};
use crmsync_server::{ServerConfig, SyncServer};
use crmsync_testkit::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app(customers: u64) -> (Arc<crmsync_core::MemoryRepository>, Router) {
    let repo = seeded_repository(customers);
    let server = SyncServer::new(repo.clone(), ServerConfig::default());
    (repo, server.router())
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get<T: DeserializeOwned>(router: &Router, uri: &str) -> (StatusCode, T) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    (status, serde_json::from_value(body).unwrap())
}

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(router, request).await
}

#[tokio::test]
async fn status_reports_counts() {
    let (_repo, router) = app(3);
    let (status, body): (_, StatusResponse) = get(&router, "/sync/status").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.sync_available);
    assert_eq!(body.entity_counts[&EntityType::Customer], 3);
    assert_eq!(body.entity_counts[&EntityType::Contact], 0);
}

#[tokio::test]
async fn status_wire_shape() {
    let (_repo, router) = app(1);
    let request = Request::get("/sync/status").body(Body::empty()).unwrap();
    let (_, body) = send(&router, request).await;

    assert!(body.get("serverTime").is_some());
    assert_eq!(body["entityCounts"]["customer"], 1);
    assert_eq!(body["syncAvailable"], true);
}

#[tokio::test]
async fn pull_pages_with_has_more() {
    let (_repo, router) = app(5);
    let (status, page): (_, PullResponse) =
        get(&router, "/sync/pull?since=&entities=customer&limit=2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(page.data[&EntityType::Customer].len(), 2);
    assert!(page.has_more[&EntityType::Customer]);

    let (_, last): (_, PullResponse) =
        get(&router, "/sync/pull?entities=customer&limit=2&after=customer:4").await;
    assert_eq!(last.data[&EntityType::Customer].len(), 1);
    assert!(!last.any_has_more());
}

#[tokio::test]
async fn pull_rejects_bad_query() {
    let (_repo, router) = app(1);
    let request = Request::get("/sync/pull?entities=invoice").body(Body::empty()).unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("invoice"));
}

#[tokio::test]
async fn push_create_correlates_client_id() {
    let (_repo, router) = app(0);
    let (status, body) = post(
        &router,
        "/sync/push",
        json!({
            "changes": [{
                "operation": "create",
                "entity": "customer",
                "clientId": "c1",
                "data": {"name": "X"},
                "timestamp": "2024-03-01T10:00:00Z"
            }],
            "conflictStrategy": "server_wins",
            "clientTime": "2024-03-01T10:00:01Z"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let result = &body["results"][0];
    assert_eq!(result["operation"], "create");
    assert_eq!(result["clientId"], "c1");
    assert_eq!(result["id"], 1);
    assert!(body.get("serverTime").is_some());
}

#[tokio::test]
async fn push_with_bad_change_is_400_and_rolled_back() {
    let (repo, router) = app(1);
    let request = PushRequest::new(
        vec![create_customer(1, "c1", "Fine"), update_customer(2, 99, 1, "Ghost")],
        ConflictStrategy::ServerWins,
    );
    let (status, body) = post(&router, "/sync/push", serde_json::to_value(&request).unwrap()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let response: PushResponse = serde_json::from_value(body).unwrap();
    assert!(!response.success);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].change.op_id, 2);
    assert_eq!(repo.all(EntityType::Customer).len(), 1);
}

#[tokio::test]
async fn push_conflict_is_not_an_error() {
    let (_repo, router) = app(1);
    let (_, body) = post(
        &router,
        "/sync/push",
        json!({"changes": [], "conflictStrategy": "merge"}),
    )
    .await;
    assert_eq!(body["success"], true);

    let request = PushRequest::new(
        vec![update_customer(1, 1, 1, "First"), update_customer(2, 1, 1, "Second")],
        ConflictStrategy::Merge,
    );
    let (status, body) = post(&router, "/sync/push", serde_json::to_value(&request).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let response: PushResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.conflicts.len(), 1);
    assert_eq!(response.conflicts[0].server_version, 2);
}

#[tokio::test]
async fn oversized_push_is_400() {
    let repo = seeded_repository(0);
    let server = SyncServer::new(repo, ServerConfig::default().with_max_push_batch(1));
    let router = server.router();
    let request = PushRequest::new(
        vec![create_customer(1, "a", "A"), create_customer(2, "b", "B")],
        ConflictStrategy::ServerWins,
    );
    let (status, body) = post(&router, "/sync/push", serde_json::to_value(&request).unwrap()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn push_infrastructure_failure_is_500() {
    let (repo, router) = app(0);
    repo.set_available(false);
    let request = PushRequest::new(vec![create_customer(1, "c1", "X")], ConflictStrategy::ServerWins);
    let (status, body) = post(&router, "/sync/push", serde_json::to_value(&request).unwrap()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body.get("results").is_none());
    assert!(body["error"].as_str().unwrap().contains("connection lost"));
}

#[tokio::test]
async fn resolve_conflict_merges_notes() {
    let repo = seeded_repository(0);
    let mut entity = customer(5, 3, "Acme");
    if let crmsync_core::EntityRecord::Customer(c) = &mut entity {
        c.note = Some("called client".into());
    }
    repo.seed(entity);
    let router = SyncServer::new(repo, ServerConfig::default()).router();

    let request = ResolveConflictRequest {
        entity: EntityType::Customer,
        entity_id: crmsync_protocol::EntityId::new(5),
        resolution: ConflictStrategy::Merge,
        client_data: record(json!({"id": 5, "version": 2, "note": "left voicemail"})),
        server_data: record(json!({"id": 5, "version": 3, "note": "called client"})),
    };
    let (status, body) = post(
        &router,
        "/sync/resolve-conflict",
        serde_json::to_value(&request).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolution_applied"], "merge");
    let response: ResolveConflictResponse = serde_json::from_value(body).unwrap();
    let resolved = response.entity.unwrap();
    assert_eq!(resolved.get("note"), Some(&json!("called client\n---\nleft voicemail")));
    assert_eq!(resolved.version(), 4);
}

#[tokio::test]
async fn resolve_conflict_unknown_record_is_404() {
    let (_repo, router) = app(0);
    let (status, body) = post(
        &router,
        "/sync/resolve-conflict",
        json!({
            "entity": "contact",
            "entityId": 8,
            "resolution": "client_wins",
            "clientData": {"id": 8, "version": 1, "firstName": "A"},
            "serverData": {"id": 8, "version": 2, "firstName": "B"}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn changes_since_checkpoint() {
    let (_repo, router) = app(2);
    let (status, body): (_, ChangesResponse) =
        get(&router, "/sync/changes?since=2023-06-01T00:00:00Z&entities=customer").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.changes[&EntityType::Customer].len(), 2);

    let request = Request::get("/sync/changes?since=2030-01-01T00:00:00Z")
        .body(Body::empty())
        .unwrap();
    let (_, raw) = send(&router, request).await;
    assert!(raw.get("server_time").is_some());
    assert_eq!(raw["changes"]["customer"], json!([]));
}

#[tokio::test]
async fn health_tracks_store() {
    let (repo, router) = app(0);
    let (status, body): (_, HealthResponse) = get(&router, "/sync/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, "healthy");
    assert_eq!(body.database, "connected");

    repo.set_available(false);
    let (status, body): (_, HealthResponse) = get(&router, "/sync/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body.is_healthy());
}
