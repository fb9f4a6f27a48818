//! Buffered transactions.
//!
//! A [`Transaction`] collects writes for a whole push batch. Nothing
//! reaches the repository until [`EntityRepository::commit`] applies the
//! buffer in one step; [`EntityRepository::rollback`] discards it.
//!
//! [`EntityRepository::commit`]: crate::repository::EntityRepository::commit
//! [`EntityRepository::rollback`]: crate::repository::EntityRepository::rollback

mod state;

pub use state::{PendingWrite, RecordSlot, Transaction, TransactionState};
