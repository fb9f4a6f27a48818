//! Free-text comments on customers.

use super::{require, SyncMeta};
use crate::error::{CoreError, CoreResult};
use crmsync_protocol::{EntityId, EntityType};
use serde::{Deserialize, Serialize};

/// A comment attached to a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Sync metadata.
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Owning customer. Required.
    #[serde(default)]
    pub customer_id: Option<EntityId>,
    /// Comment text. Required.
    #[serde(default)]
    pub content: String,
    /// Author name.
    #[serde(default)]
    pub author: Option<String>,
}

impl Comment {
    fn check(&self) -> CoreResult<()> {
        if self.customer_id.is_none() {
            return Err(CoreError::validation("customerId is required"));
        }
        require("content", Some(&self.content))
    }
}

syncable!(Comment, EntityType::Comment);
