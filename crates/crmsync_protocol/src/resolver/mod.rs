//! Conflict resolution engine.
//!
//! Given the server and client versions of a record and a strategy,
//! [`resolve`] produces either a resolved record or, for the `manual`
//! strategy, a review payload. Resolution is pure: no I/O and no errors.
//! Consistency problems in the result are reported as strings in
//! [`ResolvedRecord::validation_errors`].

pub mod fields;
mod manual;
pub mod merge;
mod validate;

pub use manual::{
    field_conflicts, suggest, FieldConflict, ManualResolution, ResolutionSuggestion,
    SuggestedAction, ValueKind,
};
pub use merge::{merge, merge_field, NOTE_SEPARATOR};
pub use validate::{is_valid_email, validate};

use crate::conflict::ConflictStrategy;
use crate::record::{fields as record_fields, SyncRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A record produced by an automatic strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRecord {
    /// The resolved record.
    pub record: SyncRecord,
    /// Strategy whose rules produced the record. For `newest_wins` this is
    /// `server_wins` or `client_wins`.
    pub strategy: ConflictStrategy,
    /// Strategy the caller asked for.
    pub requested: ConflictStrategy,
    /// Consistency problems found in `record`.
    pub validation_errors: Vec<String>,
}

impl ResolvedRecord {
    /// Returns true if the resolved record passed validation.
    pub fn is_valid(&self) -> bool {
        self.validation_errors.is_empty()
    }
}

/// Result of [`resolve`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The conflict was resolved automatically.
    Resolved(ResolvedRecord),
    /// The conflict needs a human decision.
    Manual(ManualResolution),
}

impl ResolveOutcome {
    /// Returns the resolved record, if any.
    pub fn resolved(&self) -> Option<&ResolvedRecord> {
        match self {
            ResolveOutcome::Resolved(resolved) => Some(resolved),
            ResolveOutcome::Manual(_) => None,
        }
    }

    /// Consumes the outcome, returning the resolved record if any.
    pub fn into_resolved(self) -> Option<ResolvedRecord> {
        match self {
            ResolveOutcome::Resolved(resolved) => Some(resolved),
            ResolveOutcome::Manual(_) => None,
        }
    }

    /// Returns true if the outcome needs a human decision.
    pub fn is_manual(&self) -> bool {
        matches!(self, ResolveOutcome::Manual(_))
    }
}

/// Resolves a conflict between two versions of a record.
pub fn resolve(
    server: &SyncRecord,
    client: &SyncRecord,
    strategy: ConflictStrategy,
) -> ResolveOutcome {
    let (record, applied) = match strategy {
        ConflictStrategy::ServerWins => (server_wins(server, client), ConflictStrategy::ServerWins),
        ConflictStrategy::ClientWins => (client_wins(server, client), ConflictStrategy::ClientWins),
        ConflictStrategy::Merge => (merge(server, client), ConflictStrategy::Merge),
        ConflictStrategy::NewestWins => {
            let applied = newest_side(server, client);
            let record = if applied == ConflictStrategy::ClientWins {
                client_wins(server, client)
            } else {
                server_wins(server, client)
            };
            (record, applied)
        }
        ConflictStrategy::Manual => {
            return ResolveOutcome::Manual(ManualResolution::new(server, client));
        }
    };

    let validation_errors = validate(&record);
    if !validation_errors.is_empty() {
        debug!(
            strategy = %strategy,
            errors = validation_errors.len(),
            "resolved record failed validation"
        );
    }

    ResolveOutcome::Resolved(ResolvedRecord {
        record,
        strategy: applied,
        requested: strategy,
        validation_errors,
    })
}

/// The server record, carrying over the client's correlation ID.
pub fn server_wins(server: &SyncRecord, client: &SyncRecord) -> SyncRecord {
    let mut record = server.clone();
    if let Some(client_id) = client.client_id() {
        record.set_client_id(client_id);
    }
    record
}

/// The client record with server-authoritative fields taken from the server.
pub fn client_wins(server: &SyncRecord, client: &SyncRecord) -> SyncRecord {
    let mut record = client.clone();
    for field in record_fields::SERVER_AUTHORITATIVE {
        match server.get(field) {
            Some(value) => {
                record.insert(field, value.clone());
            }
            None => {
                record.remove(field);
            }
        }
    }
    record
}

/// Picks `client_wins` or `server_wins` by comparing update times.
fn newest_side(server: &SyncRecord, client: &SyncRecord) -> ConflictStrategy {
    match (server.update_time(), client.update_time()) {
        (Some(server_at), Some(client_at)) if client_at > server_at => ConflictStrategy::ClientWins,
        (Some(_), Some(_)) => ConflictStrategy::ServerWins,
        (None, Some(_)) => ConflictStrategy::ClientWins,
        (Some(_), None) => ConflictStrategy::ServerWins,
        (None, None) => {
            warn!("newest_wins: neither record has an update time, falling back to server_wins");
            ConflictStrategy::ServerWins
        }
    }
}
