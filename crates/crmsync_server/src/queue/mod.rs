//! Background retry queue.
//!
//! A [`SyncQueueMessage`] wraps a [`SyncJob`]. The [`RetryProcessor`] runs it
//! through a [`JobHandler`]; transient failures are re-enqueued on the
//! [`RetryPolicy`](crate::RetryPolicy) schedule, everything else goes to a
//! [`DeadLetterSink`]. [`QueueWorker`] drives the processor from a
//! [`MessageQueue`].

mod dead_letter;
mod job;
mod memory;
mod message;
mod processor;
mod worker;

pub use dead_letter::{DeadLetter, DeadLetterSink, MemoryDeadLetterSink};
pub use job::{JobHandler, JobReport, OrchestratorJobHandler};
pub use memory::{MemoryMessageQueue, MessageQueue};
pub use message::{SyncJob, SyncQueueMessage};
pub use processor::{ProcessOutcome, RetryProcessor};
pub use worker::{QueueWorker, WorkerStats};
