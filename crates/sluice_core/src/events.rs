//! Event bus for observing queue activity.
//!
//! Every state change the queue makes on a caller's behalf is visible
//! here: accepted actions, successful dispatches, terminal failures
//! (which are never silent), connectivity escalation, and per-pass drain
//! reports. Subscribers receive events over plain channels; observers
//! that attach late can poll the bounded history instead.

use crate::types::{ActionId, ActionType, Priority, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

/// Why an action was removed without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The retry budget was spent on recoverable failures.
    RetryExhausted,
    /// The action outlived the retention window.
    Expired,
    /// The remote rejected the payload outright.
    PermanentError,
}

impl FailureReason {
    /// Stable wire string for the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetryExhausted => "retry-exhausted",
            Self::Expired => "expired",
            Self::PermanentError => "permanent-error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counts for one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrainReport {
    /// Actions dispatched in the pass(es).
    pub processed: u64,
    /// Recoverable failures that kept their place for a later retry.
    pub recoverable_retried: u64,
    /// Actions evicted terminally (permanent error or exhausted budget).
    pub permanently_failed: u64,
}

impl DrainReport {
    /// An empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            processed: 0,
            recoverable_retried: 0,
            permanently_failed: 0,
        }
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: Self) {
        self.processed += other.processed;
        self.recoverable_retried += other.recoverable_retried;
        self.permanently_failed += other.permanently_failed;
    }

    /// True when nothing was dispatched.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.processed == 0
    }
}

/// A single observable queue event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueueEvent {
    /// An action was accepted and made durable.
    ActionEnqueued {
        /// The new action's id.
        id: ActionId,
        /// Its dispatch tag.
        action_type: ActionType,
        /// Its priority band.
        priority: Priority,
    },
    /// An action was dispatched successfully and removed.
    ActionSucceeded {
        /// The action's id.
        id: ActionId,
        /// Its dispatch tag.
        action_type: ActionType,
    },
    /// An action was removed without succeeding.
    ActionTerminallyFailed {
        /// The action's id.
        id: ActionId,
        /// Its dispatch tag.
        action_type: ActionType,
        /// Why it was evicted.
        reason: FailureReason,
    },
    /// The outage crossed the critical-mode threshold.
    CriticalModeEntered {
        /// When connectivity was lost.
        offline_since: Timestamp,
    },
    /// Connectivity returned and critical mode cleared.
    CriticalModeExited,
    /// A drain pass finished.
    DrainCompleted {
        /// Outcome counts for the pass.
        report: DrainReport,
    },
}

/// An event paired with its bus-assigned sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedEvent {
    /// Monotonic position in the bus history, starting at 1.
    pub sequence: u64,
    /// The event itself.
    pub event: QueueEvent,
}

/// Default bounded history size.
const DEFAULT_HISTORY_LIMIT: usize = 1024;

struct BusInner {
    history: Vec<SequencedEvent>,
    next_sequence: u64,
}

/// Distributes queue events to subscribers and keeps a bounded history.
///
/// - Events are sequenced in emit order
/// - Multiple subscribers each get every event
/// - Disconnected subscribers are pruned on the next emit
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<SequencedEvent>>>,
    inner: RwLock<BusInner>,
    max_history: usize,
}

impl EventBus {
    /// Creates a bus with the default history limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Creates a bus keeping at most `max_history` events for polling.
    #[must_use]
    pub fn with_history_limit(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            inner: RwLock::new(BusInner {
                history: Vec::new(),
                next_sequence: 1,
            }),
            max_history,
        }
    }

    /// Subscribes to all future events.
    ///
    /// The receiver should be drained regularly; the channel is
    /// unbounded.
    pub fn subscribe(&self) -> Receiver<SequencedEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event, returning its assigned sequence number.
    pub fn emit(&self, event: QueueEvent) -> u64 {
        let sequenced = {
            let mut inner = self.inner.write();
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;

            let sequenced = SequencedEvent { sequence, event };
            inner.history.push(sequenced.clone());
            if inner.history.len() > self.max_history {
                let excess = inner.history.len() - self.max_history;
                inner.history.drain(0..excess);
            }
            sequenced
        };

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(sequenced.clone()).is_ok());

        sequenced.sequence
    }

    /// Returns history events with sequence greater than `cursor`, up to
    /// `limit`.
    #[must_use]
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<SequencedEvent> {
        let inner = self.inner.read();
        inner
            .history
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Sequence of the most recent event, 0 if none.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.inner.read().history.last().map_or(0, |e| e.sequence)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Number of events currently held in history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.inner.read().history.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn enqueued_event() -> QueueEvent {
        QueueEvent::ActionEnqueued {
            id: ActionId::generate(),
            action_type: ActionType::new("alert").unwrap(),
            priority: Priority::Critical,
        }
    }

    #[test]
    fn reason_wire_strings() {
        assert_eq!(FailureReason::RetryExhausted.as_str(), "retry-exhausted");
        assert_eq!(FailureReason::Expired.as_str(), "expired");
        assert_eq!(FailureReason::PermanentError.as_str(), "permanent-error");
    }

    #[test]
    fn report_merge() {
        let mut total = DrainReport::new();
        total.merge(DrainReport {
            processed: 3,
            recoverable_retried: 1,
            permanently_failed: 0,
        });
        total.merge(DrainReport {
            processed: 2,
            recoverable_retried: 0,
            permanently_failed: 2,
        });
        assert_eq!(total.processed, 5);
        assert_eq!(total.recoverable_retried, 1);
        assert_eq!(total.permanently_failed, 2);
    }

    #[test]
    fn emit_and_receive() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        let event = enqueued_event();
        bus.emit(event.clone());

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.sequence, 1);
        assert_eq!(received.event, event);
    }

    #[test]
    fn multiple_subscribers_each_receive() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.emit(QueueEvent::CriticalModeExited);

        assert_eq!(rx1.recv().unwrap().event, QueueEvent::CriticalModeExited);
        assert_eq!(rx2.recv().unwrap().event, QueueEvent::CriticalModeExited);
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);

        bus.emit(QueueEvent::CriticalModeExited);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn poll_from_cursor() {
        let bus = EventBus::new();
        for _ in 0..5 {
            bus.emit(enqueued_event());
        }

        let events = bus.poll(2, 10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].sequence, 3);
        assert_eq!(events[2].sequence, 5);
    }

    #[test]
    fn poll_respects_limit() {
        let bus = EventBus::new();
        for _ in 0..10 {
            bus.emit(enqueued_event());
        }

        assert_eq!(bus.poll(0, 3).len(), 3);
    }

    #[test]
    fn history_is_bounded() {
        let bus = EventBus::with_history_limit(5);
        for _ in 0..10 {
            bus.emit(enqueued_event());
        }

        assert_eq!(bus.history_len(), 5);
        let events = bus.poll(0, 100);
        assert_eq!(events[0].sequence, 6);
    }

    #[test]
    fn latest_sequence_advances() {
        let bus = EventBus::new();
        assert_eq!(bus.latest_sequence(), 0);

        bus.emit(enqueued_event());
        bus.emit(enqueued_event());
        assert_eq!(bus.latest_sequence(), 2);
    }

    #[test]
    fn threaded_emit_reaches_subscriber() {
        let bus = Arc::new(EventBus::new());
        let rx = bus.subscribe();

        let bus_clone = Arc::clone(&bus);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            bus_clone.emit(QueueEvent::CriticalModeExited);
        });

        let received = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(received.event, QueueEvent::CriticalModeExited);

        handle.join().unwrap();
    }
}
