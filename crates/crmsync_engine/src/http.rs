//! HTTP transport for the sync endpoints.
//!
//! [`HttpTransport`] speaks the JSON protocol over any [`HttpClient`].
//! [`ReqwestClient`] is the network implementation; [`LoopbackClient`]
//! routes requests straight to an in-process server.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use chrono::SecondsFormat;
use crmsync_protocol::{
    HealthResponse, PullRequest, PullResponse, PushRequest, PushResponse, ResolveConflictRequest,
    ResolveConflictResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn into_error(self) -> SyncError {
        let mut message = String::from_utf8_lossy(&self.body).into_owned();
        message.truncate(512);
        SyncError::Http {
            status: self.status,
            message,
        }
    }
}

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST with a JSON body.
    Post,
}

/// Trait for HTTP client implementations.
///
/// Implementations return `Err` only when no response was obtained, with
/// retryable [`SyncError::Transport`] for connection failures and timeouts.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str) -> impl Future<Output = SyncResult<HttpResponse>> + Send;

    /// Sends a POST request with a JSON body.
    fn post(&self, url: &str, body: Vec<u8>) -> impl Future<Output = SyncResult<HttpResponse>> + Send;
}

/// HTTP-based sync transport using JSON bodies.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport for the server at `base_url`
    /// (e.g. `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<Res: DeserializeOwned>(&self, path: &str) -> SyncResult<Res> {
        let response = self.client.get(&self.url(path)).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn post_json<Req: Serialize + Sync, Res: DeserializeOwned>(
        &self,
        path: &str,
        request: &Req,
    ) -> SyncResult<Res> {
        let response = self.post_raw(path, request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn post_raw<Req: Serialize + Sync>(&self, path: &str, request: &Req) -> SyncResult<HttpResponse> {
        let body = serde_json::to_vec(request)?;
        self.client.post(&self.url(path), body).await
    }
}

/// Builds the `GET /sync/pull` path with its query string.
///
/// Every value is query-safe as written (RFC 3339 in UTC, entity names,
/// `type:id` cursor pairs), so nothing is percent-encoded.
pub fn pull_path(request: &PullRequest) -> String {
    let mut params = Vec::new();
    if let Some(since) = request.since {
        params.push(format!(
            "since={}",
            since.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ));
    }
    if !request.entities.is_empty() {
        let names: Vec<&str> = request.entities.iter().map(|e| e.as_str()).collect();
        params.push(format!("entities={}", names.join(",")));
    }
    if let Some(limit) = request.limit {
        params.push(format!("limit={limit}"));
    }
    if let Some(after) = request.after_param() {
        params.push(format!("after={after}"));
    }

    if params.is_empty() {
        "/sync/pull".to_string()
    } else {
        format!("/sync/pull?{}", params.join("&"))
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let response = self.post_raw("/sync/push", request).await?;
        if response.is_success() {
            return Ok(serde_json::from_slice(&response.body)?);
        }
        // A rolled-back batch comes back as 400 with the per-change errors.
        if response.status == 400 {
            if let Ok(rejected) = serde_json::from_slice::<PushResponse>(&response.body) {
                debug!(errors = rejected.errors.len(), "push rejected by server");
                return Ok(rejected);
            }
        }
        Err(response.into_error())
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.get_json(&pull_path(request)).await
    }

    async fn resolve_conflict(
        &self,
        request: &ResolveConflictRequest,
    ) -> SyncResult<ResolveConflictResponse> {
        self.post_json("/sync/resolve-conflict", request).await
    }

    async fn health(&self) -> SyncResult<HealthResponse> {
        let response = self.client.get(&self.url("/sync/health")).await?;
        // An unhealthy server answers 503 with a regular body.
        match serde_json::from_slice::<HealthResponse>(&response.body) {
            Ok(health) => Ok(health),
            Err(_) => Err(response.into_error()),
        }
    }
}

/// [`HttpClient`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with a per-request timeout.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| SyncError::transport_fatal(err.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_connect() || err.is_timeout() || err.is_request() || err.is_body() {
        SyncError::transport_retryable(err.to_string())
    } else {
        SyncError::transport_fatal(err.to_string())
    }
}

async fn read_response(response: reqwest::Response) -> SyncResult<HttpResponse> {
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(transport_error)?;
    Ok(HttpResponse::new(status, body.to_vec()))
}

impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> SyncResult<HttpResponse> {
        let response = self.client.get(url).send().await.map_err(transport_error)?;
        read_response(response).await
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        read_response(response).await
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request for `path` (including any query string).
    fn handle(
        &self,
        method: HttpMethod,
        path: &str,
        body: Vec<u8>,
    ) -> impl Future<Output = HttpResponse> + Send;
}

/// An HTTP client that routes requests directly to an in-process server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

fn path_of(url: &str) -> &str {
    url.find("/sync/").map_or(url, |i| &url[i..])
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn get(&self, url: &str) -> SyncResult<HttpResponse> {
        Ok(self.server.handle(HttpMethod::Get, path_of(url), Vec::new()).await)
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> SyncResult<HttpResponse> {
        Ok(self.server.handle(HttpMethod::Post, path_of(url), body).await)
    }
}
