//! Queue and engine configuration.

use crate::types::Priority;
use std::time::Duration;

/// Retry budgets per priority band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryTable {
    /// Budget for critical actions.
    pub critical: u32,
    /// Budget for high-priority actions.
    pub high: u32,
    /// Budget for medium-priority actions.
    pub medium: u32,
    /// Budget for low-priority actions.
    pub low: u32,
}

impl Default for RetryTable {
    fn default() -> Self {
        Self {
            critical: Priority::Critical.default_max_retries(),
            high: Priority::High.default_max_retries(),
            medium: Priority::Medium.default_max_retries(),
            low: Priority::Low.default_max_retries(),
        }
    }
}

impl RetryTable {
    /// Returns the budget for the given band.
    #[must_use]
    pub const fn for_priority(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }

    /// Overrides the budget for one band.
    #[must_use]
    pub const fn with_budget(mut self, priority: Priority, max_retries: u32) -> Self {
        match priority {
            Priority::Critical => self.critical = max_retries,
            Priority::High => self.high = max_retries,
            Priority::Medium => self.medium = max_retries,
            Priority::Low => self.low = max_retries,
        }
        self
    }
}

/// Configuration for a queue and the engine running it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum age an action may remain queued regardless of retry
    /// budget. Default 7 days.
    pub retention_window: Duration,

    /// Continuous-offline duration after which critical mode engages.
    /// Default 300 seconds.
    pub critical_mode_threshold: Duration,

    /// How often the emergency cache refreshes while online.
    /// Default 300 seconds.
    pub cache_refresh_interval: Duration,

    /// How often the retention sweep runs while the process is alive
    /// (`Duration::ZERO` disables the ticker). Default hourly.
    pub gc_interval: Duration,

    /// Retry budgets derived at enqueue time.
    pub max_retries_by_priority: RetryTable,

    /// Maximum payload size accepted at enqueue. Default 256 KiB.
    pub max_payload_bytes: usize,

    /// Bounded event-bus history for late or polling observers.
    pub event_history_limit: usize,

    /// Dead journal records tolerated before compaction kicks in.
    pub journal_compact_min_dead: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retention_window: Duration::from_secs(7 * 24 * 60 * 60),
            critical_mode_threshold: Duration::from_secs(300),
            cache_refresh_interval: Duration::from_secs(300),
            gc_interval: Duration::from_secs(3600),
            max_retries_by_priority: RetryTable::default(),
            max_payload_bytes: 256 * 1024,
            event_history_limit: 1024,
            journal_compact_min_dead: 64,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retention window in days.
    #[must_use]
    pub const fn with_retention_window_days(mut self, days: u64) -> Self {
        self.retention_window = Duration::from_secs(days * 24 * 60 * 60);
        self
    }

    /// Sets the retention window directly.
    #[must_use]
    pub const fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    /// Sets the critical-mode threshold in seconds.
    #[must_use]
    pub const fn with_critical_mode_threshold_secs(mut self, secs: u64) -> Self {
        self.critical_mode_threshold = Duration::from_secs(secs);
        self
    }

    /// Sets the emergency-cache refresh interval in seconds.
    #[must_use]
    pub const fn with_cache_refresh_secs(mut self, secs: u64) -> Self {
        self.cache_refresh_interval = Duration::from_secs(secs);
        self
    }

    /// Sets the retention sweep interval; `Duration::ZERO` disables it.
    #[must_use]
    pub const fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Overrides the retry budget for one priority band.
    #[must_use]
    pub const fn with_max_retries(mut self, priority: Priority, max_retries: u32) -> Self {
        self.max_retries_by_priority = self.max_retries_by_priority.with_budget(priority, max_retries);
        self
    }

    /// Sets the enqueue-time payload size cap.
    #[must_use]
    pub const fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    /// Sets the event-bus history limit.
    #[must_use]
    pub const fn with_event_history_limit(mut self, limit: usize) -> Self {
        self.event_history_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.retention_window, Duration::from_secs(604_800));
        assert_eq!(config.critical_mode_threshold, Duration::from_secs(300));
        assert_eq!(config.cache_refresh_interval, Duration::from_secs(300));
        assert_eq!(config.gc_interval, Duration::from_secs(3600));
        assert_eq!(config.max_retries_by_priority, RetryTable::default());
    }

    #[test]
    fn default_retry_table() {
        let table = RetryTable::default();
        assert_eq!(table.for_priority(Priority::Critical), 10);
        assert_eq!(table.for_priority(Priority::High), 5);
        assert_eq!(table.for_priority(Priority::Medium), 3);
        assert_eq!(table.for_priority(Priority::Low), 3);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .with_retention_window_days(1)
            .with_critical_mode_threshold_secs(60)
            .with_max_retries(Priority::Low, 1);

        assert_eq!(config.retention_window, Duration::from_secs(86_400));
        assert_eq!(config.critical_mode_threshold, Duration::from_secs(60));
        assert_eq!(config.max_retries_by_priority.for_priority(Priority::Low), 1);
        assert_eq!(
            config.max_retries_by_priority.for_priority(Priority::Critical),
            10
        );
    }
}
