//! Conflict detection values and resolution strategies.

use crate::entity::{EntityId, EntityType};
use crate::error::ProtocolError;
use crate::record::SyncRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A write-write conflict between a client update and the server record.
///
/// Produced during push when the server's version is strictly greater
/// than the version the client edited. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Queue entry that produced the conflict.
    #[serde(default)]
    pub op_id: u64,
    /// Entity type.
    #[serde(rename = "entity")]
    pub entity_type: EntityType,
    /// Entity ID.
    pub entity_id: EntityId,
    /// Version the client edited.
    pub client_version: u64,
    /// Version currently stored on the server.
    pub server_version: u64,
    /// Client payload.
    pub client_data: SyncRecord,
    /// Server record.
    pub server_data: SyncRecord,
}

impl Conflict {
    /// Creates a new conflict from the two record versions.
    pub fn new(
        entity_type: EntityType,
        entity_id: EntityId,
        client_data: SyncRecord,
        server_data: SyncRecord,
    ) -> Self {
        Self {
            op_id: 0,
            entity_type,
            entity_id,
            client_version: client_data.version(),
            server_version: server_data.version(),
            client_data,
            server_data,
        }
    }

    /// Sets the originating queue entry.
    pub fn with_op_id(mut self, op_id: u64) -> Self {
        self.op_id = op_id;
        self
    }

    /// Returns true if the client is behind the server.
    pub fn is_stale_write(&self) -> bool {
        self.server_version > self.client_version
    }
}

/// Named policy governing conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Server record wins; the client ID is carried over.
    #[default]
    ServerWins,
    /// Client record wins, except for server-authoritative fields.
    ClientWins,
    /// Field-level reconciliation.
    Merge,
    /// Whichever side was updated last wins.
    NewestWins,
    /// Defer to a human.
    Manual,
}

impl ConflictStrategy {
    /// All strategies.
    pub const ALL: [ConflictStrategy; 5] = [
        ConflictStrategy::ServerWins,
        ConflictStrategy::ClientWins,
        ConflictStrategy::Merge,
        ConflictStrategy::NewestWins,
        ConflictStrategy::Manual,
    ];

    /// Returns true if this strategy resolves conflicts without a human.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictStrategy::Manual)
    }

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::ClientWins => "client_wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::NewestWins => "newest_wins",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server_wins" => Ok(ConflictStrategy::ServerWins),
            "client_wins" => Ok(ConflictStrategy::ClientWins),
            "merge" => Ok(ConflictStrategy::Merge),
            "newest_wins" => Ok(ConflictStrategy::NewestWins),
            "manual" => Ok(ConflictStrategy::Manual),
            _ => Err(ProtocolError::UnknownStrategy(s.to_string())),
        }
    }
}
