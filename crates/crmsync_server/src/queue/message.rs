//! Background sync messages.

use chrono::Utc;
use crmsync_protocol::{PullRequest, PushRequest, ResolveConflictRequest, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A full sync request executed in the background.
///
/// Runs in three stages: push, conflict resolution, pull. Any stage may be
/// empty. Stages that committed are cleared, so a retried job never
/// repeats a write.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    /// Changes to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushRequest>,
    /// Conflicts from the push still to be resolved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolve: Vec<ResolveConflictRequest>,
    /// Changes to fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullRequest>,
}

impl SyncJob {
    /// Creates a push-only job.
    pub fn push(request: PushRequest) -> Self {
        Self {
            push: Some(request),
            ..Self::default()
        }
    }

    /// Creates a pull-only job.
    pub fn pull(request: PullRequest) -> Self {
        Self {
            pull: Some(request),
            ..Self::default()
        }
    }

    /// Adds a pull to run after the push.
    pub fn then_pull(mut self, request: PullRequest) -> Self {
        self.pull = Some(request);
        self
    }
}

/// Unit of work in the background retry queue.
///
/// Only `attempt_count` changes over the message's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueMessage {
    /// Message identifier.
    pub id: Uuid,
    /// The wrapped sync request.
    pub sync_data: SyncJob,
    /// Higher runs first among ready messages.
    #[serde(default)]
    pub priority: u8,
    /// Number of failed attempts so far.
    #[serde(default)]
    pub attempt_count: u32,
    /// When the message was created.
    pub created_at: Timestamp,
}

impl SyncQueueMessage {
    /// Wraps a job with default priority.
    pub fn new(sync_data: SyncJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            sync_data,
            priority: 0,
            attempt_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}
