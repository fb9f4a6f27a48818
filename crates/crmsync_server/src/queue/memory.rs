//! In-memory delayed message queue.

use super::message::SyncQueueMessage;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// A queue of sync messages that may be held back until a given instant.
pub trait MessageQueue: Send + Sync {
    /// Adds a message that is ready immediately.
    fn enqueue(&self, message: SyncQueueMessage) {
        self.enqueue_after(message, Duration::ZERO);
    }

    /// Adds a message that becomes ready after `delay`.
    fn enqueue_after(&self, message: SyncQueueMessage, delay: Duration);

    /// Removes and returns the next ready message, if any.
    fn pop_ready(&self) -> Option<SyncQueueMessage>;

    /// Returns when the earliest held message becomes ready.
    fn next_ready_at(&self) -> Option<Instant>;

    /// Returns the number of queued messages, ready or not.
    fn len(&self) -> usize;

    /// Returns true if nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct Scheduled {
    ready_at: Instant,
    seq: u64,
    message: SyncQueueMessage,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<Scheduled>,
    next_seq: u64,
}

/// In-memory [`MessageQueue`].
///
/// Among ready messages the highest priority wins, then the one that
/// became ready first, then insertion order. Time is read from
/// `tokio::time`, so paused test clocks apply.
#[derive(Debug, Default)]
pub struct MemoryMessageQueue {
    state: Mutex<QueueState>,
}

impl MemoryMessageQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageQueue for MemoryMessageQueue {
    fn enqueue_after(&self, message: SyncQueueMessage, delay: Duration) {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push(Scheduled {
            ready_at: Instant::now() + delay,
            seq,
            message,
        });
    }

    fn pop_ready(&self) -> Option<SyncQueueMessage> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let index = state
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.ready_at <= now)
            .max_by(|(_, a), (_, b)| {
                a.message
                    .priority
                    .cmp(&b.message.priority)
                    .then(b.ready_at.cmp(&a.ready_at))
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(index, _)| index)?;
        Some(state.entries.swap_remove(index).message)
    }

    fn next_ready_at(&self) -> Option<Instant> {
        self.state.lock().entries.iter().map(|e| e.ready_at).min()
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::SyncJob;

    fn message(priority: u8) -> SyncQueueMessage {
        SyncQueueMessage::new(SyncJob::default()).with_priority(priority)
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_messages_wait() {
        let queue = MemoryMessageQueue::new();
        queue.enqueue_after(message(0), Duration::from_secs(5));

        assert_eq!(queue.len(), 1);
        assert!(queue.pop_ready().is_none());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(queue.pop_ready().is_some());
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn priority_then_fifo() {
        let queue = MemoryMessageQueue::new();
        let low = message(1);
        let first_high = message(9);
        let second_high = message(9);
        queue.enqueue(low.clone());
        queue.enqueue(first_high.clone());
        queue.enqueue(second_high.clone());

        assert_eq!(queue.pop_ready().unwrap().id, first_high.id);
        assert_eq!(queue.pop_ready().unwrap().id, second_high.id);
        assert_eq!(queue.pop_ready().unwrap().id, low.id);
        assert!(queue.pop_ready().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn next_ready_at_tracks_earliest() {
        let queue = MemoryMessageQueue::new();
        assert!(queue.next_ready_at().is_none());

        let start = Instant::now();
        queue.enqueue_after(message(0), Duration::from_secs(60));
        queue.enqueue_after(message(0), Duration::from_secs(15));
        assert_eq!(queue.next_ready_at(), Some(start + Duration::from_secs(15)));
    }
}
