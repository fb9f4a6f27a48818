//! # crmsync Protocol
//!
//! Sync data model, wire messages and conflict resolution for crmsync.
//!
//! This crate provides:
//! - `SyncRecord`, the field map exchanged between replicas
//! - `SyncOperation` for the client-side pending queue
//! - `Conflict` and `ConflictStrategy` for write-write conflicts
//! - The conflict resolution engine (`resolver`)
//! - Request/response messages for the sync endpoints
//! - `ErrorClass` for transient/permanent failure classification
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod classify;
mod conflict;
mod entity;
mod error;
mod messages;
mod operation;
mod record;
pub mod resolver;
mod timestamp;

pub use classify::{classify_http_status, Classify, ErrorClass};
pub use conflict::{Conflict, ConflictStrategy};
pub use entity::{EntityId, EntityType};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    ChangeError, ChangeErrorKind, ChangeResult, ChangeStatus, ChangesResponse, HealthResponse,
    PullRequest, PullResponse, PushRequest, PushResponse, ResolveConflictRequest,
    ResolveConflictResponse, StatusResponse,
};
pub use operation::{OperationKind, SyncOperation};
pub use record::{fields, SyncRecord};
pub use resolver::{
    resolve, FieldConflict, ManualResolution, ResolutionSuggestion, ResolveOutcome,
    ResolvedRecord, SuggestedAction, ValueKind,
};
pub use timestamp::{format_timestamp, parse_timestamp, parse_timestamp_str, Timestamp};
