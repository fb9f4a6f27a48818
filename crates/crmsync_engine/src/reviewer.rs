//! Hook for conflicts that need a human decision.
//!
//! Under the `manual` strategy the client hands each conflict, together
//! with its review payload, to a [`ConflictReviewer`] and waits for the
//! decision. Dropping the responder defers the conflict: the operation
//! stays queued and the conflict comes back on a later cycle.

use crmsync_protocol::{Conflict, ConflictStrategy, ManualResolution, SyncRecord};
use tokio::sync::{mpsc, oneshot};

/// A conflict awaiting review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    /// The conflict as reported by the server.
    pub conflict: Conflict,
    /// Per-field differences and suggestions.
    pub manual: ManualResolution,
}

/// A reviewer's choice.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDecision {
    /// Strategy to resolve with. `manual` defers.
    pub strategy: ConflictStrategy,
    /// Replacement client values, e.g. hand-picked per field. `None` keeps
    /// the values that were pushed.
    pub client_data: Option<SyncRecord>,
}

impl ReviewDecision {
    /// Resolves with `strategy` and the pushed values.
    pub fn with_strategy(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            client_data: None,
        }
    }

    /// Resolves as `client_wins` with hand-edited values.
    pub fn with_values(client_data: SyncRecord) -> Self {
        Self {
            strategy: ConflictStrategy::ClientWins,
            client_data: Some(client_data),
        }
    }
}

/// Receives conflicts that need a human decision.
pub trait ConflictReviewer: Send + Sync {
    /// Submits a conflict for review. The decision arrives on the returned
    /// channel; a closed channel defers the conflict.
    fn review(&self, request: ReviewRequest) -> oneshot::Receiver<ReviewDecision>;
}

/// A review in flight, handed to whoever presents it.
#[derive(Debug)]
pub struct PendingReview {
    /// What to review.
    pub request: ReviewRequest,
    respond: oneshot::Sender<ReviewDecision>,
}

impl PendingReview {
    /// Sends the decision back to the sync cycle.
    pub fn decide(self, decision: ReviewDecision) {
        // The cycle may have given up waiting; nothing to do then.
        let _ = self.respond.send(decision);
    }

    /// Defers the conflict to a later cycle.
    pub fn defer(self) {}
}

/// [`ConflictReviewer`] that forwards reviews over a channel.
#[derive(Debug, Clone)]
pub struct ChannelReviewer {
    sender: mpsc::UnboundedSender<PendingReview>,
}

impl ChannelReviewer {
    /// Creates a reviewer and the receiving end a UI task listens on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingReview>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ConflictReviewer for ChannelReviewer {
    fn review(&self, request: ReviewRequest) -> oneshot::Receiver<ReviewDecision> {
        let (respond, decision) = oneshot::channel();
        // If nobody listens the responder is dropped and the review defers.
        let _ = self.sender.send(PendingReview { request, respond });
        decision
    }
}
