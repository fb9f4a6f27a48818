//! Customer accounts.

use super::{check_email, require, SyncMeta};
use crate::error::CoreResult;
use crmsync_protocol::EntityType;
use serde::{Deserialize, Serialize};

/// A customer account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Sync metadata.
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Display name. Required.
    #[serde(default)]
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Postal address.
    #[serde(default)]
    pub address: Option<String>,
    /// Pipeline status (prospect, active, lost...).
    #[serde(default)]
    pub status: Option<String>,
    /// Free-text note.
    #[serde(default)]
    pub note: Option<String>,
    /// Labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Customer {
    fn check(&self) -> CoreResult<()> {
        require("name", Some(&self.name))?;
        check_email("email", self.email.as_deref())
    }
}

syncable!(Customer, EntityType::Customer);
