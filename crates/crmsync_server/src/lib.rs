//! # crmsync Sync Server
//!
//! Server-side half of crmsync.
//!
//! This crate provides:
//! - The sync orchestrator (push, pull, conflict resolution, status)
//! - HTTP endpoints under `/sync`
//! - A background retry queue with fixed-schedule backoff
//!
//! # Protocol
//!
//! One sync round-trip is push-then-pull:
//! 1. Client pushes its pending operations; the batch is applied in one
//!    transaction and stale updates come back as conflicts
//! 2. Client resolves conflicts through `/sync/resolve-conflict`
//! 3. Client pulls records changed since its checkpoint, page by page
//! 4. Client adopts the first page's `serverTime` as its next checkpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use crmsync_server::{ServerConfig, SyncServer};
//!
//! # async fn run() -> crmsync_server::ServerResult<()> {
//! let server = SyncServer::in_memory(ServerConfig::default());
//! server.serve(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code must not panic; errors are propagated.
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod config;
mod error;
mod orchestrator;
pub mod queue;
mod routes;
mod server;

pub use config::{RetryPolicy, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use orchestrator::SyncOrchestrator;
pub use routes::{sync_router, AppState, ChangesParams, PullParams};
pub use server::SyncServer;
