//! Retry/backoff processing of queued sync messages.

use super::dead_letter::{DeadLetter, DeadLetterSink};
use super::job::JobHandler;
use super::memory::MessageQueue;
use super::message::SyncQueueMessage;
use crate::config::RetryPolicy;
use crmsync_protocol::Classify;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// What happened to a processed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The job succeeded.
    Completed,
    /// The job ran but left conflicts for manual resolution. The message
    /// and its conflicts went to the dead-letter sink.
    HeldForReview {
        /// Number of conflicts held.
        conflicts: usize,
    },
    /// The job failed transiently and was re-enqueued.
    Retried {
        /// Attempt count after this failure.
        attempt: u32,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// The job failed permanently or ran out of attempts.
    DeadLettered {
        /// Final error.
        reason: String,
    },
}

/// Consumes one message at a time, retrying transient failures on a fixed
/// schedule and dead-lettering everything else.
///
/// A retried message carries only the stages its earlier attempts did not
/// commit.
pub struct RetryProcessor {
    handler: Arc<dyn JobHandler>,
    queue: Arc<dyn MessageQueue>,
    dead_letters: Arc<dyn DeadLetterSink>,
    policy: RetryPolicy,
}

impl RetryProcessor {
    /// Creates a processor.
    pub fn new(
        handler: Arc<dyn JobHandler>,
        queue: Arc<dyn MessageQueue>,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            handler,
            queue,
            dead_letters,
            policy,
        }
    }

    /// Returns the queue messages are re-enqueued into.
    pub fn queue(&self) -> &Arc<dyn MessageQueue> {
        &self.queue
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs one message to completion, retry or drop.
    pub fn process(&self, mut message: SyncQueueMessage) -> ProcessOutcome {
        let err = match self.handler.handle(&mut message.sync_data) {
            Ok(report) if !report.unresolved.is_empty() => {
                let conflicts = report.unresolved.len();
                warn!(id = %message.id, conflicts, "sync job held for manual conflict review");
                self.dead_letters
                    .dead_letter(DeadLetter::for_review(message, report.unresolved));
                return ProcessOutcome::HeldForReview { conflicts };
            }
            Ok(_) => {
                debug!(id = %message.id, attempts = message.attempt_count, "sync job completed");
                return ProcessOutcome::Completed;
            }
            Err(err) => err,
        };

        let class = err.class();
        if class.is_transient() && message.attempt_count < self.policy.max_attempts {
            message.attempt_count += 1;
            let attempt = message.attempt_count;
            let delay = self.policy.delay_for(attempt);
            warn!(
                id = %message.id,
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_secs = delay.as_secs_f64(),
                error = %err,
                "transient sync failure, retrying"
            );
            self.queue.enqueue_after(message, delay);
            return ProcessOutcome::Retried { attempt, delay };
        }

        let reason = err.to_string();
        error!(
            critical = true,
            id = %message.id,
            attempts = message.attempt_count,
            ?class,
            error = %reason,
            "sync job failed permanently, dropping"
        );
        self.dead_letters
            .dead_letter(DeadLetter::new(message, reason.clone()));
        ProcessOutcome::DeadLettered { reason }
    }
}
