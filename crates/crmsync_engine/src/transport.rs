//! Transport abstraction for talking to the sync server.

use crate::error::{SyncError, SyncResult};
use crmsync_protocol::{
    HealthResponse, PullRequest, PullResponse, PushRequest, PushResponse, ResolveConflictRequest,
    ResolveConflictResponse,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// Client side of the sync endpoints.
///
/// A push that the server rolled back because of per-change errors is an
/// `Ok` response with `success: false`; only failures to obtain a response
/// are errors.
pub trait SyncTransport: Send + Sync {
    /// Sends pending changes.
    fn push(&self, request: &PushRequest) -> impl Future<Output = SyncResult<PushResponse>> + Send;

    /// Fetches one page of server changes.
    fn pull(&self, request: &PullRequest) -> impl Future<Output = SyncResult<PullResponse>> + Send;

    /// Resolves a conflict under an explicit strategy.
    fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> impl Future<Output = SyncResult<ResolveConflictResponse>> + Send;

    /// Probes server health.
    fn health(&self) -> impl Future<Output = SyncResult<HealthResponse>> + Send;
}

/// A scripted transport for testing.
///
/// Responses are queued per endpoint and handed out in order. Requests are
/// recorded for inspection.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    push_responses: Mutex<VecDeque<SyncResult<PushResponse>>>,
    pull_responses: Mutex<VecDeque<SyncResult<PullResponse>>>,
    resolve_responses: Mutex<VecDeque<SyncResult<ResolveConflictResponse>>>,
    pushes: Mutex<Vec<PushRequest>>,
    pulls: Mutex<Vec<PullRequest>>,
    resolves: Mutex<Vec<ResolveConflictRequest>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates a connected transport with nothing scripted.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            push_responses: Mutex::new(VecDeque::new()),
            pull_responses: Mutex::new(VecDeque::new()),
            resolve_responses: Mutex::new(VecDeque::new()),
            pushes: Mutex::new(Vec::new()),
            pulls: Mutex::new(Vec::new()),
            resolves: Mutex::new(Vec::new()),
        }
    }

    /// Queues a push response.
    pub fn queue_push(&self, response: SyncResult<PushResponse>) {
        self.push_responses.lock().push_back(response);
    }

    /// Queues a pull response.
    pub fn queue_pull(&self, response: SyncResult<PullResponse>) {
        self.pull_responses.lock().push_back(response);
    }

    /// Queues a resolve response.
    pub fn queue_resolve(&self, response: SyncResult<ResolveConflictResponse>) {
        self.resolve_responses.lock().push_back(response);
    }

    /// Sets the connected state. A disconnected transport fails every call
    /// with a retryable error.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the push requests received so far.
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().clone()
    }

    /// Returns the pull requests received so far.
    pub fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().clone()
    }

    /// Returns the resolve requests received so far.
    pub fn resolves(&self) -> Vec<ResolveConflictRequest> {
        self.resolves.lock().clone()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("connection refused"))
        }
    }
}

fn next<T>(queue: &Mutex<VecDeque<SyncResult<T>>>, endpoint: &str) -> SyncResult<T> {
    queue
        .lock()
        .pop_front()
        .unwrap_or_else(|| Err(SyncError::Codec(format!("no mock {endpoint} response set"))))
}

impl SyncTransport for MockTransport {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.check_connected()?;
        self.pushes.lock().push(request.clone());
        next(&self.push_responses, "push")
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.check_connected()?;
        self.pulls.lock().push(request.clone());
        next(&self.pull_responses, "pull")
    }

    async fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        self.check_connected()?;
        self.resolves.lock().push(request.clone());
        next(&self.resolve_responses, "resolve")
    }

    async fn health(&self) -> SyncResult<HealthResponse> {
        self.check_connected()?;
        Ok(HealthResponse::new(true, chrono::Utc::now()))
    }
}
