//! Entity adapters.
//!
//! Each entity type is a plain struct that implements [`Syncable`]: it can
//! render itself as a [`SyncRecord`] and absorb one. [`EntityRecord`] is the
//! tagged variant the repository stores, selected by [`EntityType`].

use crate::error::{CoreError, CoreResult};
use crmsync_protocol::{fields, EntityId, EntityType, SyncRecord, Timestamp};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Implements [`Syncable`] for an entity struct with a `meta` field.
macro_rules! syncable {
    ($ty:ty, $tag:expr) => {
        impl $crate::entity::Syncable for $ty {
            fn entity_type(&self) -> crmsync_protocol::EntityType {
                $tag
            }

            fn meta(&self) -> &$crate::entity::SyncMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::entity::SyncMeta {
                &mut self.meta
            }

            fn to_fields(&self) -> crmsync_protocol::SyncRecord {
                $crate::entity::encode(self)
            }

            fn apply_fields(
                &mut self,
                fields: &crmsync_protocol::SyncRecord,
            ) -> $crate::error::CoreResult<()> {
                $crate::entity::apply(self, fields)
            }

            fn validate(&self) -> $crate::error::CoreResult<()> {
                self.check()
            }
        }
    };
}

mod comment;
mod contact;
mod customer;
mod energy;

pub use comment::Comment;
pub use contact::Contact;
pub use customer::Customer;
pub use energy::Energy;

/// Sync metadata carried by every entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Server-assigned ID.
    #[serde(default)]
    pub id: Option<EntityId>,
    /// Client correlation ID, set once at creation.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Optimistic concurrency token.
    #[serde(default)]
    pub version: u64,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    /// Last time the record went through a sync.
    #[serde(default)]
    pub last_synced_at: Option<Timestamp>,
}

/// Capability every replicated entity implements.
pub trait Syncable {
    /// Returns the entity type tag.
    fn entity_type(&self) -> EntityType;

    /// Returns the sync metadata.
    fn meta(&self) -> &SyncMeta;

    /// Returns the sync metadata mutably.
    fn meta_mut(&mut self) -> &mut SyncMeta;

    /// Renders the entity as a field map, metadata included.
    fn to_fields(&self) -> SyncRecord;

    /// Applies business fields from a field map.
    ///
    /// Server-authoritative fields and `clientId` are ignored, as are
    /// fields the entity does not know.
    fn apply_fields(&mut self, fields: &SyncRecord) -> CoreResult<()>;

    /// Checks business invariants.
    fn validate(&self) -> CoreResult<()>;

    /// Returns the server-assigned ID.
    fn id(&self) -> Option<EntityId> {
        self.meta().id
    }

    /// Returns the version.
    fn version(&self) -> u64 {
        self.meta().version
    }

    /// Returns the client correlation ID.
    fn client_id(&self) -> Option<&str> {
        self.meta().client_id.as_deref()
    }

    /// Returns the modification time used for pulls.
    fn modified_at(&self) -> Option<Timestamp> {
        let meta = self.meta();
        meta.updated_at.or(meta.created_at)
    }
}

/// Fields the entity never takes from an incoming payload.
fn is_protected(field: &str) -> bool {
    fields::SERVER_AUTHORITATIVE.contains(&field)
        || field == fields::CLIENT_ID
        || field == fields::SYNCED_AT
}

/// Serializes an entity to a field map.
pub(crate) fn encode<T: Serialize>(entity: &T) -> SyncRecord {
    serde_json::to_value(entity)
        .ok()
        .and_then(|value| SyncRecord::from_value(value).ok())
        .unwrap_or_default()
}

/// Overlays known, unprotected fields of `incoming` onto `entity`.
pub(crate) fn apply<T: Serialize + DeserializeOwned>(
    entity: &mut T,
    incoming: &SyncRecord,
) -> CoreResult<()> {
    let mut current = encode(entity);
    for (name, value) in incoming.iter() {
        if is_protected(name) || !current.contains(name) {
            continue;
        }
        current.insert(name, value.clone());
    }
    *entity = serde_json::from_value(current.into_value())
        .map_err(|e| CoreError::type_mismatch(e.to_string()))?;
    Ok(())
}

/// Fails with a validation error when `value` is blank.
pub(crate) fn require(field: &str, value: Option<&str>) -> CoreResult<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(CoreError::validation(format!("{field} is required"))),
    }
}

/// Fails when a non-empty email is malformed.
pub(crate) fn check_email(field: &str, value: Option<&str>) -> CoreResult<()> {
    match value {
        Some(v) if !v.is_empty() && !crmsync_protocol::resolver::is_valid_email(v) => Err(
            CoreError::validation(format!("{field} is not a valid email address")),
        ),
        _ => Ok(()),
    }
}

/// A stored entity of any type.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    /// Customer.
    Customer(Customer),
    /// Energy contract.
    Energy(Energy),
    /// Contact person.
    Contact(Contact),
    /// Comment.
    Comment(Comment),
}

impl EntityRecord {
    /// Creates a blank entity of the given type.
    pub fn new(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Customer => EntityRecord::Customer(Customer::default()),
            EntityType::Energy => EntityRecord::Energy(Energy::default()),
            EntityType::Contact => EntityRecord::Contact(Contact::default()),
            EntityType::Comment => EntityRecord::Comment(Comment::default()),
        }
    }

    /// Creates an entity of the given type populated from a field map.
    pub fn from_fields(entity_type: EntityType, fields: &SyncRecord) -> CoreResult<Self> {
        let mut entity = Self::new(entity_type);
        entity.apply_fields(fields)?;
        Ok(entity)
    }

    fn inner(&self) -> &dyn Syncable {
        match self {
            EntityRecord::Customer(e) => e,
            EntityRecord::Energy(e) => e,
            EntityRecord::Contact(e) => e,
            EntityRecord::Comment(e) => e,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Syncable {
        match self {
            EntityRecord::Customer(e) => e,
            EntityRecord::Energy(e) => e,
            EntityRecord::Contact(e) => e,
            EntityRecord::Comment(e) => e,
        }
    }
}

impl Syncable for EntityRecord {
    fn entity_type(&self) -> EntityType {
        self.inner().entity_type()
    }

    fn meta(&self) -> &SyncMeta {
        self.inner().meta()
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        self.inner_mut().meta_mut()
    }

    fn to_fields(&self) -> SyncRecord {
        self.inner().to_fields()
    }

    fn apply_fields(&mut self, fields: &SyncRecord) -> CoreResult<()> {
        self.inner_mut().apply_fields(fields)
    }

    fn validate(&self) -> CoreResult<()> {
        self.inner().validate()
    }
}
