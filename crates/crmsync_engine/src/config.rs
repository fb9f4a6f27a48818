//! Configuration for the sync client.

use crmsync_protocol::{ConflictStrategy, EntityType};
use std::time::Duration;

/// Configuration for the sync client driver.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Records requested per pull page.
    pub page_size: usize,
    /// Pages fetched per cycle before giving up on advancing the checkpoint.
    pub max_pages_per_cycle: usize,
    /// Operations sent per push request. Keep at or below the server's
    /// batch limit.
    pub max_push_batch: usize,
    /// Interval between timer-triggered syncs.
    pub sync_interval: Duration,
    /// Wait after connectivity returns before syncing.
    pub settle_delay: Duration,
    /// Strategy used for conflicts returned by push.
    pub conflict_strategy: ConflictStrategy,
    /// Entity types to pull.
    pub entity_types: Vec<EntityType>,
}

impl ClientConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            page_size: 100,
            max_pages_per_cycle: 50,
            max_push_batch: 500,
            sync_interval: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            conflict_strategy: ConflictStrategy::ServerWins,
            entity_types: EntityType::ALL.to_vec(),
        }
    }

    /// Sets the pull page size.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the page budget per cycle.
    pub fn with_max_pages_per_cycle(mut self, pages: usize) -> Self {
        self.max_pages_per_cycle = pages.max(1);
        self
    }

    /// Sets the push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size.max(1);
        self
    }

    /// Sets the timer interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the connectivity settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Restricts the entity types pulled.
    pub fn with_entity_types(mut self, types: Vec<EntityType>) -> Self {
        self.entity_types = types;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
