//! Contact persons.

use super::{check_email, SyncMeta};
use crate::error::{CoreError, CoreResult};
use crmsync_protocol::{EntityId, EntityType};
use serde::{Deserialize, Serialize};

/// A contact person at a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Sync metadata.
    #[serde(flatten)]
    pub meta: SyncMeta,
    /// Owning customer. Required.
    #[serde(default)]
    pub customer_id: Option<EntityId>,
    /// First name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Email.
    #[serde(default)]
    pub email: Option<String>,
    /// Phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Job title.
    #[serde(default)]
    pub position: Option<String>,
}

impl Contact {
    fn check(&self) -> CoreResult<()> {
        if self.customer_id.is_none() {
            return Err(CoreError::validation("customerId is required"));
        }
        let named = [&self.first_name, &self.last_name]
            .iter()
            .any(|n| n.as_deref().is_some_and(|n| !n.trim().is_empty()));
        if !named {
            return Err(CoreError::validation("firstName or lastName is required"));
        }
        check_email("email", self.email.as_deref())
    }
}

syncable!(Contact, EntityType::Contact);
