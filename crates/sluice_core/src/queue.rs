//! The ordered pending-action set.
//!
//! [`ActionQueue`] owns every queued action and the store persisting
//! them. All mutation happens under one internal mutex (the queue is the
//! single writer of its store) and is synchronous; callers that need to
//! await do so between queue calls, never inside them. Events are
//! emitted after the lock is released.

use crate::action::{ActionDraft, QueuedAction};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::events::{EventBus, FailureReason, QueueEvent};
use crate::retention::RetentionPolicy;
use crate::store::ActionStore;
use crate::types::{ActionId, Priority, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What became of an action after a recoverable failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// The action keeps its place for a later retry.
    Retained,
    /// The failure spent the retry budget; the action was evicted.
    Exhausted,
}

/// Point-in-time queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Pending actions in total.
    pub depth: usize,
    /// Pending critical actions.
    pub critical: usize,
    /// Pending high-priority actions.
    pub high: usize,
    /// Pending medium-priority actions.
    pub medium: usize,
    /// Pending low-priority actions.
    pub low: usize,
    /// Enqueue time of the oldest pending action.
    pub oldest_enqueued_at: Option<Timestamp>,
    /// Actions accepted since the queue was created.
    pub total_enqueued: u64,
    /// Actions dispatched successfully since creation.
    pub total_succeeded: u64,
    /// Actions evicted terminally since creation.
    pub total_evicted: u64,
}

impl QueueStats {
    /// Pending count for one priority band.
    #[must_use]
    pub const fn by_priority(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

struct QueueInner<S> {
    store: S,
    /// Kept sorted by [`QueuedAction::drain_cmp`] at all times.
    actions: Vec<QueuedAction>,
    next_sequence: u64,
    total_enqueued: u64,
    total_succeeded: u64,
    total_evicted: u64,
}

impl<S> QueueInner<S> {
    fn position(&self, id: ActionId) -> Option<usize> {
        self.actions.iter().position(|a| a.id == id)
    }

    fn insert_sorted(&mut self, action: QueuedAction) {
        let at = self
            .actions
            .partition_point(|existing| existing.drain_cmp(&action).is_lt());
        self.actions.insert(at, action);
    }
}

/// The durable, priority-ordered set of pending actions.
pub struct ActionQueue<S: ActionStore> {
    inner: Mutex<QueueInner<S>>,
    events: Arc<EventBus>,
    policy: RetentionPolicy,
    config: Config,
}

impl<S: ActionStore> ActionQueue<S> {
    /// Creates an empty queue over `store`.
    ///
    /// Call [`ActionQueue::reload`] afterwards to recover persisted
    /// actions; a fresh store needs no reload.
    #[must_use]
    pub fn new(store: S, config: Config) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                store,
                actions: Vec::new(),
                next_sequence: 1,
                total_enqueued: 0,
                total_succeeded: 0,
                total_evicted: 0,
            }),
            events: Arc::new(EventBus::with_history_limit(config.event_history_limit)),
            policy: RetentionPolicy::new(config.retention_window),
            config,
        }
    }

    /// The bus carrying this queue's events.
    #[must_use]
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// The configuration the queue was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accepts an action into the queue.
    ///
    /// The action is persisted before this returns; only then does it
    /// enter the ordered index and produce an `ActionEnqueued` event.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the payload exceeds the configured
    /// size cap, or a storage error if the action cannot be persisted.
    pub fn enqueue(&self, draft: ActionDraft) -> CoreResult<ActionId> {
        if draft.payload.len() > self.config.max_payload_bytes {
            return Err(CoreError::PayloadTooLarge {
                size: draft.payload.len(),
                max: self.config.max_payload_bytes,
            });
        }

        let event;
        let id;
        {
            let mut inner = self.inner.lock();
            let sequence = inner.next_sequence;
            let action = QueuedAction {
                id: ActionId::generate(),
                action_type: draft.action_type,
                payload: draft.payload,
                priority: draft.priority,
                enqueued_at: Timestamp::now(),
                sequence,
                retry_count: 0,
                max_retries: self
                    .config
                    .max_retries_by_priority
                    .for_priority(draft.priority),
                last_error: None,
            };

            inner.store.save(&action)?;
            inner.next_sequence += 1;
            inner.total_enqueued += 1;
            id = action.id;
            event = QueueEvent::ActionEnqueued {
                id: action.id,
                action_type: action.action_type.clone(),
                priority: action.priority,
            };
            debug!(%id, action_type = %action.action_type, priority = %action.priority, "action enqueued");
            inner.insert_sorted(action);
        }

        self.events.emit(event);
        Ok(id)
    }

    /// Point-in-time view of the queue in drain order.
    #[must_use]
    pub fn snapshot_ordered(&self) -> Vec<QueuedAction> {
        self.inner.lock().actions.clone()
    }

    /// Number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().actions.len()
    }

    /// True when no actions are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().actions.is_empty()
    }

    /// Returns the pending action with the given id, if any.
    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<QueuedAction> {
        let inner = self.inner.lock();
        inner.position(id).map(|at| inner.actions[at].clone())
    }

    /// Removes an action whose dispatch succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ActionNotFound`] if the action is no longer
    /// queued, or a storage error if the removal cannot be persisted.
    pub fn mark_succeeded(&self, id: ActionId) -> CoreResult<()> {
        let event;
        {
            let mut inner = self.inner.lock();
            let at = inner
                .position(id)
                .ok_or(CoreError::ActionNotFound { id })?;
            let action = inner.actions.remove(at);
            inner.store.delete(id)?;
            inner.total_succeeded += 1;
            debug!(%id, action_type = %action.action_type, "action succeeded");
            event = QueueEvent::ActionSucceeded {
                id,
                action_type: action.action_type,
            };
        }

        self.events.emit(event);
        Ok(())
    }

    /// Records a recoverable dispatch failure.
    ///
    /// The retry count is incremented on the existing entry - its
    /// position in the drain order does not change - and the update is
    /// persisted. Once the budget is spent the action is evicted and a
    /// terminal-failure event fires instead.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ActionNotFound`] if the action is no longer
    /// queued, or a storage error if the update cannot be persisted.
    pub fn mark_recoverable_failure(
        &self,
        id: ActionId,
        error: impl Into<String>,
    ) -> CoreResult<RetryDisposition> {
        let mut event = None;
        let disposition;
        {
            let mut inner = self.inner.lock();
            let at = inner
                .position(id)
                .ok_or(CoreError::ActionNotFound { id })?;

            let mut action = inner.actions[at].clone();
            action.retry_count += 1;
            action.last_error = Some(error.into());

            if action.retries_exhausted() {
                inner.actions.remove(at);
                inner.store.delete(id)?;
                inner.total_evicted += 1;
                warn!(
                    %id,
                    action_type = %action.action_type,
                    retries = action.retry_count,
                    "retry budget exhausted, evicting"
                );
                event = Some(QueueEvent::ActionTerminallyFailed {
                    id,
                    action_type: action.action_type,
                    reason: FailureReason::RetryExhausted,
                });
                disposition = RetryDisposition::Exhausted;
            } else {
                inner.store.save(&action)?;
                debug!(
                    %id,
                    retry_count = action.retry_count,
                    max_retries = action.max_retries,
                    "recoverable failure recorded"
                );
                inner.actions[at] = action;
                disposition = RetryDisposition::Retained;
            }
        }

        if let Some(event) = event {
            self.events.emit(event);
        }
        Ok(disposition)
    }

    /// Evicts an action the remote rejected outright.
    ///
    /// Permanent failures bypass the retry budget entirely.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ActionNotFound`] if the action is no longer
    /// queued, or a storage error if the removal cannot be persisted.
    pub fn mark_permanent_failure(
        &self,
        id: ActionId,
        error: impl Into<String>,
    ) -> CoreResult<()> {
        let error: String = error.into();
        let event;
        {
            let mut inner = self.inner.lock();
            let at = inner
                .position(id)
                .ok_or(CoreError::ActionNotFound { id })?;
            let action = inner.actions.remove(at);
            inner.store.delete(id)?;
            inner.total_evicted += 1;
            warn!(
                %id,
                action_type = %action.action_type,
                %error,
                "permanent failure, evicting"
            );
            event = QueueEvent::ActionTerminallyFailed {
                id,
                action_type: action.action_type,
                reason: FailureReason::PermanentError,
            };
        }

        self.events.emit(event);
        Ok(())
    }

    /// Rebuilds the queue from the store.
    ///
    /// Persisted actions pass through the retention sweep before they
    /// re-enter the queue; sweep evictions are deleted from the store
    /// and surfaced as terminal-failure events. Returns the number of
    /// actions now pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or an eviction
    /// cannot be persisted.
    pub fn reload(&self) -> CoreResult<usize> {
        let mut events = Vec::new();
        let kept_count;
        {
            let mut inner = self.inner.lock();
            let loaded = inner.store.load()?;
            let outcome = self.policy.sweep(Timestamp::now(), loaded);

            for (action, reason) in outcome.evicted {
                inner.store.delete(action.id)?;
                inner.total_evicted += 1;
                warn!(id = %action.id, %reason, "evicting stale action on reload");
                events.push(QueueEvent::ActionTerminallyFailed {
                    id: action.id,
                    action_type: action.action_type,
                    reason: reason.into(),
                });
            }

            let mut kept = outcome.kept;
            kept.sort_by(|a, b| a.drain_cmp(b));
            let max_sequence = kept.iter().map(|a| a.sequence).max().unwrap_or(0);
            inner.next_sequence = inner.next_sequence.max(max_sequence + 1);
            kept_count = kept.len();
            inner.actions = kept;
            debug!(pending = kept_count, "queue reloaded");
        }

        for event in events {
            self.events.emit(event);
        }
        Ok(kept_count)
    }

    /// Runs the retention sweep over the live queue as of `now`.
    ///
    /// Returns the number of actions evicted.
    ///
    /// # Errors
    ///
    /// Returns a storage error if an eviction cannot be persisted.
    pub fn sweep_now(&self, now: Timestamp) -> CoreResult<usize> {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let actions = std::mem::take(&mut inner.actions);
            let outcome = self.policy.sweep(now, actions);

            for (action, reason) in outcome.evicted {
                inner.store.delete(action.id)?;
                inner.total_evicted += 1;
                warn!(id = %action.id, %reason, "evicting stale action");
                events.push(QueueEvent::ActionTerminallyFailed {
                    id: action.id,
                    action_type: action.action_type,
                    reason: reason.into(),
                });
            }
            inner.actions = outcome.kept;
        }

        let evicted = events.len();
        if evicted > 0 {
            info!(evicted, "retention sweep evicted stale actions");
        }
        for event in events {
            self.events.emit(event);
        }
        Ok(evicted)
    }

    /// Current queue counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        let mut stats = QueueStats {
            depth: inner.actions.len(),
            total_enqueued: inner.total_enqueued,
            total_succeeded: inner.total_succeeded,
            total_evicted: inner.total_evicted,
            oldest_enqueued_at: inner.actions.iter().map(|a| a.enqueued_at).min(),
            ..QueueStats::default()
        };
        for action in &inner.actions {
            match action.priority {
                Priority::Critical => stats.critical += 1,
                Priority::High => stats.high += 1,
                Priority::Medium => stats.medium += 1,
                Priority::Low => stats.low += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Payload;
    use crate::store::MemoryStore;
    use crate::types::ActionType;
    use ciborium::value::Value;
    use std::time::Duration;

    fn payload() -> Payload {
        Payload::from_map(vec![("entity_id", Value::Text("e-1".into()))]).unwrap()
    }

    fn draft(action_type: &str, priority: Priority) -> ActionDraft {
        ActionDraft::new(ActionType::new(action_type).unwrap(), payload(), priority)
    }

    fn queue() -> ActionQueue<MemoryStore> {
        ActionQueue::new(MemoryStore::new(), Config::default())
    }

    #[test]
    fn enqueue_persists_before_returning() {
        let store = MemoryStore::new();
        let q = ActionQueue::new(store.clone(), Config::default());

        let id = q.enqueue(draft("alert", Priority::Critical)).unwrap();
        let persisted = store.get(id).unwrap();
        assert_eq!(persisted.retry_count, 0);
        assert_eq!(persisted.max_retries, 10);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn enqueue_emits_event() {
        let q = queue();
        let rx = q.events().subscribe();
        let id = q.enqueue(draft("alert", Priority::High)).unwrap();

        match rx.try_recv().unwrap().event {
            QueueEvent::ActionEnqueued {
                id: event_id,
                priority,
                ..
            } => {
                assert_eq!(event_id, id);
                assert_eq!(priority, Priority::High);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn oversized_payload_is_rejected_and_never_created() {
        let store = MemoryStore::new();
        let q = ActionQueue::new(
            store.clone(),
            Config::default().with_max_payload_bytes(8),
        );

        let err = q.enqueue(draft("alert", Priority::Low)).unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn snapshot_orders_by_priority_then_fifo() {
        let q = queue();
        q.enqueue(draft("low-1", Priority::Low)).unwrap();
        q.enqueue(draft("crit-1", Priority::Critical)).unwrap();
        q.enqueue(draft("med-1", Priority::Medium)).unwrap();
        q.enqueue(draft("crit-2", Priority::Critical)).unwrap();

        let order: Vec<_> = q
            .snapshot_ordered()
            .iter()
            .map(|a| a.action_type.as_str().to_string())
            .collect();
        assert_eq!(order, ["crit-1", "crit-2", "med-1", "low-1"]);
    }

    #[test]
    fn mark_succeeded_removes_and_deletes() {
        let store = MemoryStore::new();
        let q = ActionQueue::new(store.clone(), Config::default());
        let id = q.enqueue(draft("alert", Priority::Medium)).unwrap();

        q.mark_succeeded(id).unwrap();
        assert!(q.is_empty());
        assert!(store.is_empty());
        assert_eq!(q.stats().total_succeeded, 1);
    }

    #[test]
    fn mark_unknown_id_is_not_found() {
        let q = queue();
        let err = q.mark_succeeded(ActionId::generate()).unwrap_err();
        assert!(matches!(err, CoreError::ActionNotFound { .. }));
    }

    #[test]
    fn recoverable_failure_updates_in_place() {
        let store = MemoryStore::new();
        let q = ActionQueue::new(store.clone(), Config::default());
        q.enqueue(draft("first", Priority::Medium)).unwrap();
        let id = q.enqueue(draft("second", Priority::Medium)).unwrap();
        q.enqueue(draft("third", Priority::Medium)).unwrap();

        let disposition = q.mark_recoverable_failure(id, "timeout").unwrap();
        assert_eq!(disposition, RetryDisposition::Retained);

        // Position within the band is unchanged; the retry is persisted.
        let order: Vec<_> = q
            .snapshot_ordered()
            .iter()
            .map(|a| a.action_type.as_str().to_string())
            .collect();
        assert_eq!(order, ["first", "second", "third"]);
        assert_eq!(store.get(id).unwrap().retry_count, 1);
        assert_eq!(
            store.get(id).unwrap().last_error.as_deref(),
            Some("timeout")
        );
    }

    #[test]
    fn retry_exhaustion_evicts_exactly_at_budget() {
        let store = MemoryStore::new();
        let q = ActionQueue::new(store.clone(), Config::default());
        let rx = q.events().subscribe();
        let id = q.enqueue(draft("check-in", Priority::Medium)).unwrap();

        assert_eq!(
            q.mark_recoverable_failure(id, "e1").unwrap(),
            RetryDisposition::Retained
        );
        assert_eq!(
            q.mark_recoverable_failure(id, "e2").unwrap(),
            RetryDisposition::Retained
        );
        assert_eq!(
            q.mark_recoverable_failure(id, "e3").unwrap(),
            RetryDisposition::Exhausted
        );

        assert!(q.is_empty());
        assert!(store.is_empty());

        let reasons: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e.event {
                QueueEvent::ActionTerminallyFailed { reason, .. } => Some(reason),
                _ => None,
            })
            .collect();
        assert_eq!(reasons, vec![FailureReason::RetryExhausted]);
    }

    #[test]
    fn permanent_failure_bypasses_retry_budget() {
        let store = MemoryStore::new();
        let q = ActionQueue::new(store.clone(), Config::default());
        let rx = q.events().subscribe();
        let id = q.enqueue(draft("alert", Priority::Critical)).unwrap();

        q.mark_permanent_failure(id, "rejected by remote").unwrap();
        assert!(q.is_empty());
        assert!(store.is_empty());

        match rx.try_recv().unwrap().event {
            QueueEvent::ActionEnqueued { .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
        match rx.try_recv().unwrap().event {
            QueueEvent::ActionTerminallyFailed { reason, .. } => {
                assert_eq!(reason, FailureReason::PermanentError);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn reload_restores_identity_fields() {
        let store = MemoryStore::new();
        let q = ActionQueue::new(store.clone(), Config::default());
        let id = q.enqueue(draft("check-in", Priority::High)).unwrap();
        drop(q);

        // Same store, fresh queue: a simulated process restart.
        let restarted = ActionQueue::new(store, Config::default());
        assert_eq!(restarted.reload().unwrap(), 1);

        let action = restarted.get(id).unwrap();
        assert_eq!(action.action_type.as_str(), "check-in");
        assert_eq!(action.priority, Priority::High);
        assert_eq!(action.retry_count, 0);
    }

    #[test]
    fn reload_sweeps_expired_actions() {
        let mut store = MemoryStore::new();
        let stale = QueuedAction {
            id: ActionId::generate(),
            action_type: ActionType::new("alert").unwrap(),
            payload: payload(),
            priority: Priority::Medium,
            // 1970 is well past any retention window.
            enqueued_at: Timestamp::from_millis(1_000),
            sequence: 1,
            retry_count: 1,
            max_retries: 3,
            last_error: None,
        };
        store.save(&stale).unwrap();

        let q = ActionQueue::new(store.clone(), Config::default());
        let rx = q.events().subscribe();
        assert_eq!(q.reload().unwrap(), 0);
        assert!(store.is_empty());

        match rx.try_recv().unwrap().event {
            QueueEvent::ActionTerminallyFailed { reason, .. } => {
                assert_eq!(reason, FailureReason::Expired);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn reload_continues_sequence_above_persisted_max() {
        let store = MemoryStore::new();
        let q = ActionQueue::new(store.clone(), Config::default());
        q.enqueue(draft("first", Priority::Low)).unwrap();
        q.enqueue(draft("second", Priority::Low)).unwrap();
        drop(q);

        let restarted = ActionQueue::new(store, Config::default());
        restarted.reload().unwrap();
        restarted.enqueue(draft("third", Priority::Low)).unwrap();

        let sequences: Vec<_> = restarted
            .snapshot_ordered()
            .iter()
            .map(|a| a.sequence)
            .collect();
        assert_eq!(sequences, [1, 2, 3]);
    }

    #[test]
    fn sweep_now_evicts_aged_actions() {
        let q = queue();
        let id = q.enqueue(draft("alert", Priority::Low)).unwrap();
        let enqueued_at = q.get(id).unwrap().enqueued_at;

        let not_yet = enqueued_at.plus(Duration::from_secs(60));
        assert_eq!(q.sweep_now(not_yet).unwrap(), 0);

        let eight_days = enqueued_at.plus(Duration::from_secs(8 * 24 * 60 * 60));
        assert_eq!(q.sweep_now(eight_days).unwrap(), 1);
        assert!(q.is_empty());
        assert_eq!(q.stats().total_evicted, 1);
    }

    #[test]
    fn stats_count_by_priority() {
        let q = queue();
        q.enqueue(draft("a", Priority::Critical)).unwrap();
        q.enqueue(draft("b", Priority::Critical)).unwrap();
        q.enqueue(draft("c", Priority::Low)).unwrap();

        let stats = q.stats();
        assert_eq!(stats.depth, 3);
        assert_eq!(stats.by_priority(Priority::Critical), 2);
        assert_eq!(stats.by_priority(Priority::Low), 1);
        assert_eq!(stats.by_priority(Priority::High), 0);
        assert!(stats.oldest_enqueued_at.is_some());
        assert_eq!(stats.total_enqueued, 3);
    }
}
