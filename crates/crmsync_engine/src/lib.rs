//! # crmsync Sync Engine
//!
//! Client-side half of crmsync.
//!
//! This crate provides:
//! - The sync client state machine (idle, syncing, offline)
//! - The local replica store: records, pending queue, checkpoint, drafts
//! - HTTP transport abstraction with `reqwest` and loopback clients
//! - A review hook for conflicts under the `manual` strategy
//!
//! ## Architecture
//!
//! The client implements a **push-then-pull** model:
//! 1. Push the pending queue; applied operations leave the queue by `opId`
//! 2. Resolve returned conflicts (automatically or through a reviewer)
//! 3. Pull server changes page by page and mark them synced
//! 4. Advance the checkpoint only once no page reports `hasMore`
//!
//! ## Key Invariants
//!
//! - At most one cycle in flight per client
//! - The server's clock, not the client's, becomes the checkpoint
//! - A failed cycle leaves the queue and checkpoint untouched
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use crmsync_engine::{ClientConfig, HttpTransport, MemoryReplicaStore, ReqwestClient, SyncClient};
//!
//! # async fn run() -> crmsync_engine::SyncResult<()> {
//! let transport = HttpTransport::new("http://localhost:8080", ReqwestClient::new(Duration::from_secs(30))?);
//! let client = SyncClient::new(
//!     ClientConfig::default(),
//!     Arc::new(MemoryReplicaStore::new()),
//!     Arc::new(transport),
//! );
//! let outcome = client.sync_now().await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), warn(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod client;
mod config;
mod error;
mod http;
mod reviewer;
mod store;
mod transport;

pub use client::{CycleReport, SyncClient, SyncState, SyncStatus, TriggerOutcome, TriggerReason};
pub use config::ClientConfig;
pub use error::{SyncError, SyncResult};
pub use http::{
    pull_path, HttpClient, HttpMethod, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer,
    ReqwestClient,
};
pub use reviewer::{ChannelReviewer, ConflictReviewer, PendingReview, ReviewDecision, ReviewRequest};
pub use store::{
    LocalReplicaStore, MemoryReplicaStore, Metadata, RecordKey, ReplicaSnapshot, Withdrawal,
};
pub use transport::{MockTransport, SyncTransport};
