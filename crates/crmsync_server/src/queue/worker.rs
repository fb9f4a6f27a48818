//! Async worker draining the retry queue.

use super::processor::{ProcessOutcome, RetryProcessor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Counters kept by a [`QueueWorker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs that succeeded.
    pub completed: u64,
    /// Jobs that ran but left conflicts for review.
    pub held_for_review: u64,
    /// Transient failures re-enqueued.
    pub retried: u64,
    /// Messages dropped.
    pub dead_lettered: u64,
}

/// Feeds ready messages to a [`RetryProcessor`] until shut down.
pub struct QueueWorker {
    processor: Arc<RetryProcessor>,
    idle_poll: Duration,
}

impl QueueWorker {
    /// Creates a worker. `idle_poll` bounds the sleep when the queue is empty.
    pub fn new(processor: Arc<RetryProcessor>, idle_poll: Duration) -> Self {
        Self {
            processor,
            idle_poll,
        }
    }

    /// Processes every message that is ready now.
    pub fn drain_ready(&self, stats: &mut WorkerStats) -> usize {
        let mut processed = 0;
        while let Some(message) = self.processor.queue().pop_ready() {
            match self.processor.process(message) {
                ProcessOutcome::Completed => stats.completed += 1,
                ProcessOutcome::HeldForReview { .. } => stats.held_for_review += 1,
                ProcessOutcome::Retried { .. } => stats.retried += 1,
                ProcessOutcome::DeadLettered { .. } => stats.dead_lettered += 1,
            }
            processed += 1;
        }
        processed
    }

    /// Runs until `shutdown` flips to true, sleeping until the next message
    /// becomes ready.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!("queue worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let processed = self.drain_ready(&mut stats);
            if processed > 0 {
                debug!(processed, "queue batch drained");
            }

            let idle_deadline = Instant::now() + self.idle_poll;
            let wake_at = self
                .processor
                .queue()
                .next_ready_at()
                .map_or(idle_deadline, |at| at.min(idle_deadline));

            tokio::select! {
                _ = sleep_until(wake_at) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(
            completed = stats.completed,
            retried = stats.retried,
            held_for_review = stats.held_for_review,
            dead_lettered = stats.dead_lettered,
            "queue worker stopped"
        );
        stats
    }

    /// Runs until the queue is empty. Intended for tests and one-shot drains.
    pub async fn run_until_empty(&self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        loop {
            self.drain_ready(&mut stats);
            match self.processor.queue().next_ready_at() {
                Some(at) => sleep_until(at).await,
                None => break,
            }
        }
        stats
    }
}

