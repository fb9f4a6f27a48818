//! Server configuration.

use crmsync_protocol::ConflictStrategy;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Page size used when a pull names no limit.
    pub default_pull_limit: usize,
    /// Upper bound for pull page sizes.
    pub max_pull_limit: usize,
    /// Maximum number of changes in one push.
    pub max_push_batch: usize,
    /// Strategy assumed when a request names none.
    pub default_strategy: ConflictStrategy,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            default_pull_limit: 100,
            max_pull_limit: 1000,
            max_push_batch: 500,
            default_strategy: ConflictStrategy::ServerWins,
        }
    }

    /// Sets the default pull page size.
    pub fn with_default_pull_limit(mut self, limit: usize) -> Self {
        self.default_pull_limit = limit;
        self
    }

    /// Sets the maximum pull page size.
    pub fn with_max_pull_limit(mut self, limit: usize) -> Self {
        self.max_pull_limit = limit;
        self
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Sets the default conflict strategy.
    pub fn with_default_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Clamps a requested pull limit to the configured bounds.
    pub fn pull_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_pull_limit)
            .clamp(1, self.max_pull_limit.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

/// Retry policy for the background sync queue.
///
/// The delay schedule is fixed and small: attempt `n` (1-based) waits
/// `delays[n - 1]`, clamped to the last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before a message is dead-lettered.
    pub max_attempts: u32,
    /// Delay before each retry.
    pub delays: Vec<Duration>,
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(max_attempts: u32, delays: Vec<Duration>) -> Self {
        Self {
            max_attempts,
            delays,
        }
    }

    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay schedule.
    pub fn with_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Returns the delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = (attempt.max(1) - 1) as usize;
        self.delays
            .get(index)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(15),
                Duration::from_secs(60),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.default_pull_limit, 100);
        assert_eq!(config.max_pull_limit, 1000);
        assert_eq!(config.max_push_batch, 500);
        assert_eq!(config.default_strategy, ConflictStrategy::ServerWins);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_default_pull_limit(10)
            .with_max_pull_limit(50)
            .with_max_push_batch(20)
            .with_default_strategy(ConflictStrategy::Merge);

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.pull_limit(None), 10);
        assert_eq!(config.pull_limit(Some(500)), 50);
        assert_eq!(config.pull_limit(Some(0)), 1);
        assert_eq!(config.max_push_batch, 20);
    }

    #[test]
    fn retry_schedule_clamps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(15));
        assert_eq!(policy.delay_for(3), Duration::from_secs(60));
        assert_eq!(policy.delay_for(7), Duration::from_secs(60));
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));

        let empty = RetryPolicy::default().with_delays(vec![]);
        assert_eq!(empty.delay_for(1), Duration::ZERO);
    }
}
