//! Entity type tags and server-assigned identifiers.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of records the sync engine replicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// A customer account.
    Customer,
    /// An energy contract attached to a customer.
    Energy,
    /// A contact person attached to a customer.
    Contact,
    /// A free-text comment attached to a customer.
    Comment,
}

impl EntityType {
    /// All entity types, in sync order.
    pub const ALL: [EntityType; 4] = [
        EntityType::Customer,
        EntityType::Energy,
        EntityType::Contact,
        EntityType::Comment,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Customer => "customer",
            EntityType::Energy => "energy",
            EntityType::Contact => "contact",
            EntityType::Comment => "comment",
        }
    }

    /// Parses a comma-separated list such as `customer,contact`.
    ///
    /// Blank entries are skipped. An empty list yields all types.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, ProtocolError> {
        let mut types = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let ty = part.parse()?;
            if !types.contains(&ty) {
                types.push(ty);
            }
        }
        if types.is_empty() {
            types.extend(Self::ALL);
        }
        Ok(types)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" | "customers" => Ok(EntityType::Customer),
            "energy" | "energies" => Ok(EntityType::Energy),
            "contact" | "contacts" => Ok(EntityType::Contact),
            "comment" | "comments" => Ok(EntityType::Comment),
            _ => Err(ProtocolError::UnknownEntityType(s.to_string())),
        }
    }
}

/// Server-assigned record identifier.
///
/// Identifiers are allocated in ascending order per entity type and are
/// never reused, which makes them usable as a pagination key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Creates a new entity ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
