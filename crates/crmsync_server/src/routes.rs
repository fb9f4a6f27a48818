//! HTTP endpoints for the sync orchestrator.

use crate::error::{ServerError, ServerResult};
use crate::orchestrator::SyncOrchestrator;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use crmsync_protocol::{
    parse_timestamp_str, ChangesResponse, EntityType, HealthResponse, PullRequest, PullResponse,
    PushRequest, ResolveConflictRequest, ResolveConflictResponse, StatusResponse, Timestamp,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<SyncOrchestrator>,
}

impl AppState {
    /// Wraps an orchestrator.
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Returns the orchestrator.
    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }
}

/// Builds the `/sync` router.
pub fn sync_router(state: AppState) -> Router {
    Router::new()
        .route("/sync/status", get(status))
        .route("/sync/pull", get(pull))
        .route("/sync/push", post(push))
        .route("/sync/resolve-conflict", post(resolve_conflict))
        .route("/sync/changes", get(changes))
        .route("/sync/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query string of `GET /sync/pull`.
#[derive(Debug, Default, Deserialize)]
pub struct PullParams {
    /// Checkpoint; empty means full sync.
    #[serde(default)]
    pub since: Option<String>,
    /// Comma-separated entity types; empty means all.
    #[serde(default)]
    pub entities: Option<String>,
    /// Page size.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Continuation cursor, `customer:10,contact:4`.
    #[serde(default)]
    pub after: Option<String>,
}

impl PullParams {
    /// Converts the query string into a pull request.
    pub fn into_request(self) -> ServerResult<PullRequest> {
        let since = parse_since(self.since.as_deref())?;
        let entities = parse_entities(self.entities.as_deref())?;
        let mut request = PullRequest::new(since, entities);
        request.limit = self.limit;
        if let Some(after) = self.after.as_deref() {
            request.after = PullRequest::parse_after(after)?;
        }
        Ok(request)
    }
}

/// Query string of `GET /sync/changes`.
#[derive(Debug, Default, Deserialize)]
pub struct ChangesParams {
    /// Checkpoint; empty means everything.
    #[serde(default)]
    pub since: Option<String>,
    /// Comma-separated entity types; empty means all.
    #[serde(default)]
    pub entities: Option<String>,
}

fn parse_since(raw: Option<&str>) -> ServerResult<Option<Timestamp>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_timestamp_str(raw)
            .map(Some)
            .ok_or_else(|| ServerError::InvalidRequest(format!("invalid since: {raw}"))),
    }
}

fn parse_entities(raw: Option<&str>) -> ServerResult<Vec<EntityType>> {
    Ok(EntityType::parse_list(raw.unwrap_or_default())?)
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(state.orchestrator.status())
}

async fn pull(
    State(state): State<AppState>,
    Query(params): Query<PullParams>,
) -> ServerResult<Json<PullResponse>> {
    let request = params.into_request()?;
    Ok(Json(state.orchestrator.pull(&request)?))
}

async fn push(State(state): State<AppState>, Json(request): Json<PushRequest>) -> Response {
    match state.orchestrator.push(request) {
        Ok(response) if response.success => Json(response).into_response(),
        Ok(response) => (StatusCode::BAD_REQUEST, Json(response)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn resolve_conflict(
    State(state): State<AppState>,
    Json(request): Json<ResolveConflictRequest>,
) -> ServerResult<Json<ResolveConflictResponse>> {
    Ok(Json(state.orchestrator.resolve_conflict(request)?))
}

async fn changes(
    State(state): State<AppState>,
    Query(params): Query<ChangesParams>,
) -> ServerResult<Json<ChangesResponse>> {
    let since = parse_since(params.since.as_deref())?;
    let entities = parse_entities(params.entities.as_deref())?;
    Ok(Json(state.orchestrator.changes(since, &entities)?))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.orchestrator.health();
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}
