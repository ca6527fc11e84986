//! Stale-entry eviction.

use crate::action::QueuedAction;
use crate::events::FailureReason;
use crate::types::Timestamp;
use std::fmt;
use std::time::Duration;

/// Why the retention sweep removed an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The action outlived the retention window.
    Expired,
    /// The retry budget was already spent.
    RetryExhausted,
}

impl EvictionReason {
    /// Stable diagnostic string for the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::RetryExhausted => "retry-exhausted",
        }
    }
}

impl From<EvictionReason> for FailureReason {
    fn from(reason: EvictionReason) -> Self {
        match reason {
            EvictionReason::Expired => Self::Expired,
            EvictionReason::RetryExhausted => Self::RetryExhausted,
        }
    }
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one retention sweep.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Actions that stay in the queue, original order preserved.
    pub kept: Vec<QueuedAction>,
    /// Actions removed, each tagged with why.
    pub evicted: Vec<(QueuedAction, EvictionReason)>,
}

impl SweepOutcome {
    /// Number of evicted actions.
    #[must_use]
    pub fn evicted_count(&self) -> usize {
        self.evicted.len()
    }
}

/// The eviction rule for aged-out and retry-exhausted actions.
///
/// `sweep` is a pure function of an explicit `now`; it runs on queue
/// reload and from a periodic ticker, and routes every removal through
/// the queue so evictions are persisted and surfaced as terminal events.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Maximum age an action may remain queued regardless of retry
    /// budget.
    pub retention_window: Duration,
}

impl RetentionPolicy {
    /// Creates a policy with the given retention window.
    #[must_use]
    pub const fn new(retention_window: Duration) -> Self {
        Self { retention_window }
    }

    /// Partitions `actions` into kept and evicted.
    ///
    /// Age is checked before the retry budget: an action that is both
    /// expired and exhausted is tagged [`EvictionReason::Expired`], since
    /// age eviction applies independent of error state.
    #[must_use]
    pub fn sweep(&self, now: Timestamp, actions: Vec<QueuedAction>) -> SweepOutcome {
        let mut kept = Vec::new();
        let mut evicted = Vec::new();

        for action in actions {
            if action.is_expired(now, self.retention_window) {
                evicted.push((action, EvictionReason::Expired));
            } else if action.retries_exhausted() {
                evicted.push((action, EvictionReason::RetryExhausted));
            } else {
                kept.push(action);
            }
        }

        SweepOutcome { kept, evicted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Payload;
    use crate::types::{ActionId, ActionType, Priority};
    use ciborium::value::Value;

    const WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn action(enqueued_at: u64, retry_count: u32) -> QueuedAction {
        QueuedAction {
            id: ActionId::generate(),
            action_type: ActionType::new("alert").unwrap(),
            payload: Payload::from_map(vec![("entity_id", Value::Text("e-1".into()))]).unwrap(),
            priority: Priority::Medium,
            enqueued_at: Timestamp::from_millis(enqueued_at),
            sequence: 0,
            retry_count,
            max_retries: 3,
            last_error: None,
        }
    }

    #[test]
    fn keeps_fresh_actions() {
        let policy = RetentionPolicy::new(WINDOW);
        let now = Timestamp::from_millis(1_000_000);

        let outcome = policy.sweep(now, vec![action(500_000, 0), action(900_000, 2)]);
        assert_eq!(outcome.kept.len(), 2);
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn evicts_expired_regardless_of_retry_budget() {
        let policy = RetentionPolicy::new(WINDOW);
        let start = Timestamp::from_millis(0);
        let now = start.plus(WINDOW).plus(Duration::from_secs(1));

        let outcome = policy.sweep(now, vec![action(0, 0)]);
        assert!(outcome.kept.is_empty());
        assert_eq!(outcome.evicted[0].1, EvictionReason::Expired);
    }

    #[test]
    fn evicts_retry_exhausted() {
        let policy = RetentionPolicy::new(WINDOW);
        let now = Timestamp::from_millis(10_000);

        let outcome = policy.sweep(now, vec![action(5_000, 3)]);
        assert_eq!(outcome.evicted[0].1, EvictionReason::RetryExhausted);
    }

    #[test]
    fn expired_wins_over_exhausted() {
        let policy = RetentionPolicy::new(Duration::from_secs(60));
        let now = Timestamp::from_millis(0).plus(Duration::from_secs(120));

        let outcome = policy.sweep(now, vec![action(0, 3)]);
        assert_eq!(outcome.evicted[0].1, EvictionReason::Expired);
    }

    #[test]
    fn preserves_order_of_kept_actions() {
        let policy = RetentionPolicy::new(WINDOW);
        let now = Timestamp::from_millis(10_000);

        let a = action(1_000, 0);
        let b = action(2_000, 0);
        let ids = [a.id, b.id];

        let outcome = policy.sweep(now, vec![a, b]);
        let kept_ids: Vec<_> = outcome.kept.iter().map(|x| x.id).collect();
        assert_eq!(kept_ids, ids);
    }

    #[test]
    fn reason_maps_to_failure_reason() {
        assert_eq!(
            FailureReason::from(EvictionReason::Expired),
            FailureReason::Expired
        );
        assert_eq!(
            FailureReason::from(EvictionReason::RetryExhausted),
            FailureReason::RetryExhausted
        );
    }
}
