//! Destination for messages that will never be retried.

use super::message::SyncQueueMessage;
use chrono::Utc;
use crmsync_protocol::{ResolveConflictRequest, Timestamp};
use parking_lot::Mutex;

/// Receives permanently failed messages.
pub trait DeadLetterSink: Send + Sync {
    /// Takes ownership of a dropped message.
    fn dead_letter(&self, letter: DeadLetter);
}

/// A message that will not run again and why.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    /// The message as it was last attempted.
    pub message: SyncQueueMessage,
    /// Final error.
    pub reason: String,
    /// Conflicts the job could not settle without a person.
    pub conflicts: Vec<ResolveConflictRequest>,
    /// When it was dropped.
    pub dropped_at: Timestamp,
}

impl DeadLetter {
    /// Wraps a failed message.
    pub fn new(message: SyncQueueMessage, reason: impl Into<String>) -> Self {
        Self {
            message,
            reason: reason.into(),
            conflicts: Vec::new(),
            dropped_at: Utc::now(),
        }
    }

    /// Wraps a finished message whose conflicts need manual resolution.
    pub fn for_review(message: SyncQueueMessage, conflicts: Vec<ResolveConflictRequest>) -> Self {
        let reason = format!("{} conflicts need manual resolution", conflicts.len());
        Self {
            conflicts,
            ..Self::new(message, reason)
        }
    }
}

/// In-memory [`DeadLetterSink`].
#[derive(Debug, Default)]
pub struct MemoryDeadLetterSink {
    letters: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetterSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every dropped message so far.
    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().clone()
    }

    /// Returns the number of dropped messages.
    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    /// Returns true if nothing was dropped.
    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }
}

impl DeadLetterSink for MemoryDeadLetterSink {
    fn dead_letter(&self, letter: DeadLetter) {
        self.letters.lock().push(letter);
    }
}
