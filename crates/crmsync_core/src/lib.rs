//! # crmsync Core
//!
//! Server-of-record side of crmsync.
//!
//! This crate provides:
//! - The `Syncable` capability and one adapter per entity type
//! - Buffered transactions with atomic commit
//! - The `EntityRepository` trait and an in-memory implementation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod repository;
mod transaction;

pub use entity::{Comment, Contact, Customer, Energy, EntityRecord, SyncMeta, Syncable};
pub use error::{CoreError, CoreResult};
pub use repository::{EntityRepository, MemoryRepository, Page, RepoOp};
pub use transaction::{PendingWrite, RecordSlot, Transaction, TransactionState};
