//! Single-flight drain engine.

use crate::connectivity::ConnectivityHandle;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::EngineResult;
use sluice_core::{
    ActionDraft, ActionId, ActionQueue, ActionStore, CoreError, CoreResult, DrainReport,
    EventBus, QueueEvent, QueuedAction, RetryDisposition,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drain counters accumulated over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    /// Drain calls that actually ran (not coalesced or skipped).
    pub drains: u64,
    /// Individual passes across those drains.
    pub passes: u64,
    /// Actions dispatched in total.
    pub dispatched: u64,
    /// Merged report of the most recent drain.
    pub last_report: Option<DrainReport>,
}

/// Drains the queue against the dispatcher under a single-flight
/// guarantee.
///
/// The engine is `Idle` or `Draining`; a `drain` call while draining is
/// coalesced into a follow-up pass rather than run in parallel, so each
/// pending action is dispatched at most once per pass. A pass operates
/// on a fixed ordered snapshot: actions enqueued mid-pass wait for the
/// next one.
pub struct SyncEngine<S: ActionStore> {
    queue: Arc<ActionQueue<S>>,
    dispatcher: Arc<Dispatcher>,
    connectivity: ConnectivityHandle,
    events: Arc<EventBus>,
    draining: AtomicBool,
    pending_pass: AtomicBool,
    stats: Mutex<EngineStats>,
}

impl<S: ActionStore + 'static> SyncEngine<S> {
    /// Creates an engine over an existing queue and dispatcher.
    #[must_use]
    pub fn new(
        queue: Arc<ActionQueue<S>>,
        dispatcher: Arc<Dispatcher>,
        connectivity: ConnectivityHandle,
    ) -> Self {
        let events = queue.events();
        Self {
            queue,
            dispatcher,
            connectivity,
            events,
            draining: AtomicBool::new(false),
            pending_pass: AtomicBool::new(false),
            stats: Mutex::new(EngineStats::default()),
        }
    }

    /// The queue this engine drains.
    #[must_use]
    pub fn queue(&self) -> &Arc<ActionQueue<S>> {
        &self.queue
    }

    /// The handler registry.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The connectivity view this engine consults.
    #[must_use]
    pub fn connectivity(&self) -> &ConnectivityHandle {
        &self.connectivity
    }

    /// True while a drain is in flight.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Lifetime drain counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        *self.stats.lock()
    }

    /// Enqueues an action, checking the handler's required payload
    /// fields when one is already registered for the type.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a missing required field or an
    /// oversized payload, or a storage error if the action cannot be
    /// persisted.
    pub fn enqueue(&self, draft: ActionDraft) -> CoreResult<ActionId> {
        if let Some(required) = self.dispatcher.required_fields(&draft.action_type) {
            let required: Vec<&str> = required.iter().map(String::as_str).collect();
            let missing = draft.payload.missing_fields(&required);
            if !missing.is_empty() {
                return Err(CoreError::validation(format!(
                    "payload for {:?} is missing required fields: {}",
                    draft.action_type.as_str(),
                    missing.join(", ")
                )));
            }
        }
        self.queue.enqueue(draft)
    }

    /// Drains the queue until it is empty of dispatchable work.
    ///
    /// Returns an empty report without doing anything when offline or
    /// when another drain is already in flight (the request then
    /// coalesces into a follow-up pass of that drain). Otherwise runs
    /// passes until no fresh actions remain, emitting `DrainCompleted`
    /// per pass, and returns the merged report.
    ///
    /// # Errors
    ///
    /// Returns an error if queue bookkeeping cannot be persisted;
    /// dispatch failures are outcomes, not errors.
    pub async fn drain(&self) -> EngineResult<DrainReport> {
        if !self.connectivity.is_online() {
            debug!("drain skipped: offline");
            return Ok(DrainReport::new());
        }
        if self.draining.swap(true, Ordering::SeqCst) {
            self.pending_pass.store(true, Ordering::SeqCst);
            debug!("drain already in flight, coalescing trigger");
            return Ok(DrainReport::new());
        }

        let mut merged = DrainReport::new();
        let mut passes = 0u64;
        loop {
            let result = self.run_passes().await;
            self.draining.store(false, Ordering::SeqCst);
            let (report, ran) = result?;
            merged.merge(report);
            passes += ran;

            // A trigger that coalesced at any point up to the flag
            // release above still owes its caller a pass.
            if !self.pending_pass.swap(false, Ordering::SeqCst) {
                break;
            }
            if !self.connectivity.is_online() {
                break;
            }
            if self.draining.swap(true, Ordering::SeqCst) {
                // Another drain claimed the flag; it sees the queue.
                break;
            }
        }

        if passes > 0 {
            let mut stats = self.stats.lock();
            stats.drains += 1;
            stats.passes += passes;
            stats.dispatched += merged.processed;
            stats.last_report = Some(merged);
        }
        Ok(merged)
    }

    /// Fire-and-forget drain used by the connectivity monitor.
    ///
    /// The spawned task logs the merged report instead of returning it.
    pub fn trigger_drain(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            match engine.drain().await {
                Ok(report) if report.is_empty() => {}
                Ok(report) => info!(
                    processed = report.processed,
                    retried = report.recoverable_retried,
                    failed = report.permanently_failed,
                    "drain completed"
                ),
                Err(e) => warn!("drain failed: {e}"),
            }
        });
    }

    async fn run_passes(&self) -> EngineResult<(DrainReport, u64)> {
        let mut merged = DrainReport::new();
        let mut passes = 0u64;

        loop {
            let snapshot = self.queue.snapshot_ordered();
            if snapshot.is_empty() {
                break;
            }

            let newest_sequence = snapshot.iter().map(|a| a.sequence).max().unwrap_or(0);
            let report = self.run_pass(&snapshot).await?;
            passes += 1;
            merged.merge(report);
            self.events.emit(QueueEvent::DrainCompleted { report });
            debug!(
                pass = passes,
                processed = report.processed,
                "drain pass finished"
            );

            if !self.connectivity.is_online() {
                break;
            }
            // Another pass only for work this one could not have seen:
            // actions enqueued mid-pass. Coalesced triggers are settled
            // by `drain` once the in-flight flag is released.
            let fresh_work = self
                .queue
                .snapshot_ordered()
                .iter()
                .any(|a| a.sequence > newest_sequence);
            if !fresh_work {
                break;
            }
        }

        Ok((merged, passes))
    }

    /// Dispatches one fixed snapshot in order.
    ///
    /// The batch is never interrupted: a connectivity loss mid-pass
    /// lets in-flight dispatches fail naturally as recoverable errors.
    async fn run_pass(&self, snapshot: &[QueuedAction]) -> EngineResult<DrainReport> {
        let mut report = DrainReport::new();

        for action in snapshot {
            let outcome = self.dispatcher.dispatch(action).await;
            report.processed += 1;

            match outcome {
                DispatchOutcome::Success => {
                    ignore_missing(self.queue.mark_succeeded(action.id))?;
                }
                DispatchOutcome::Recoverable(reason) => {
                    match ignore_missing(self.queue.mark_recoverable_failure(action.id, reason))?
                    {
                        Some(RetryDisposition::Retained) => report.recoverable_retried += 1,
                        Some(RetryDisposition::Exhausted) => report.permanently_failed += 1,
                        None => {}
                    }
                }
                DispatchOutcome::Permanent(reason) => {
                    ignore_missing(self.queue.mark_permanent_failure(action.id, reason))?;
                    report.permanently_failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Downgrades a not-found mark to a no-op: the retention sweep may have
/// evicted a snapshot member while its dispatch was in flight.
fn ignore_missing<T>(result: CoreResult<T>) -> CoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CoreError::ActionNotFound { id }) => {
            debug!(%id, "action vanished mid-pass, ignoring");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::ScriptedHandler;
    use ciborium::value::Value;
    use sluice_core::{ActionType, Config, MemoryStore, Payload, Priority};
    use std::time::Duration;

    fn payload() -> Payload {
        Payload::from_map(vec![("entity_id", Value::Text("e-1".into()))]).unwrap()
    }

    fn draft(action_type: &str, priority: Priority) -> ActionDraft {
        ActionDraft::new(ActionType::new(action_type).unwrap(), payload(), priority)
    }

    struct Fixture {
        engine: Arc<SyncEngine<MemoryStore>>,
        handler: Arc<ScriptedHandler>,
        connectivity: ConnectivityHandle,
    }

    fn fixture(handler: ScriptedHandler) -> Fixture {
        let queue = Arc::new(ActionQueue::new(MemoryStore::new(), Config::default()));
        let connectivity =
            ConnectivityHandle::new(Duration::from_secs(300), queue.events());
        let dispatcher = Arc::new(Dispatcher::new());
        let handler = Arc::new(handler);
        for tag in ["alert", "check-in", "request-create"] {
            dispatcher.register(ActionType::new(tag).unwrap(), handler.clone());
        }
        let engine = Arc::new(SyncEngine::new(
            queue,
            dispatcher,
            connectivity.clone(),
        ));
        Fixture {
            engine,
            handler,
            connectivity,
        }
    }

    #[tokio::test]
    async fn drain_dispatches_in_priority_order() {
        let f = fixture(ScriptedHandler::new());
        let low = f.engine.enqueue(draft("alert", Priority::Low)).unwrap();
        let critical = f.engine.enqueue(draft("alert", Priority::Critical)).unwrap();
        let medium = f.engine.enqueue(draft("alert", Priority::Medium)).unwrap();

        let report = f.engine.drain().await.unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(f.handler.calls(), vec![critical, medium, low]);
        assert!(f.engine.queue().is_empty());
    }

    #[tokio::test]
    async fn drain_is_a_noop_while_offline() {
        let f = fixture(ScriptedHandler::new());
        f.engine.enqueue(draft("alert", Priority::High)).unwrap();
        f.connectivity
            .apply_signal(false, sluice_core::Timestamp::now());

        let report = f.engine.drain().await.unwrap();
        assert!(report.is_empty());
        assert_eq!(f.handler.call_count(), 0);
        assert_eq!(f.engine.queue().len(), 1);
    }

    #[tokio::test]
    async fn recoverable_failure_keeps_action_for_next_drain() {
        let f = fixture(ScriptedHandler::new());
        let id = f.engine.enqueue(draft("check-in", Priority::Medium)).unwrap();
        f.handler
            .push_outcome(DispatchOutcome::Recoverable("timeout".into()));

        let report = f.engine.drain().await.unwrap();
        assert_eq!(report.recoverable_retried, 1);
        assert_eq!(f.engine.queue().get(id).unwrap().retry_count, 1);

        // Next drain succeeds (script exhausted).
        let report = f.engine.drain().await.unwrap();
        assert_eq!(report.processed, 1);
        assert!(f.engine.queue().is_empty());
    }

    #[tokio::test]
    async fn permanent_failure_evicts_on_first_dispatch() {
        let f = fixture(ScriptedHandler::new());
        let id = f.engine.enqueue(draft("alert", Priority::Critical)).unwrap();
        f.handler
            .push_outcome(DispatchOutcome::Permanent("rejected".into()));

        let report = f.engine.drain().await.unwrap();
        assert_eq!(report.permanently_failed, 1);
        assert!(f.engine.queue().get(id).is_none());

        // Never dispatched again.
        f.engine.drain().await.unwrap();
        assert_eq!(f.handler.call_count(), 1);
    }

    #[tokio::test]
    async fn retried_leftovers_do_not_trigger_an_extra_pass() {
        let f = fixture(ScriptedHandler::new());
        f.engine.enqueue(draft("alert", Priority::Medium)).unwrap();
        f.handler
            .push_outcome(DispatchOutcome::Recoverable("unavailable".into()));

        let report = f.engine.drain().await.unwrap();
        // One pass only: the failed action is held for a later trigger,
        // not hammered in an immediate retry loop.
        assert_eq!(report.processed, 1);
        assert_eq!(f.handler.call_count(), 1);
        assert_eq!(f.engine.queue().len(), 1);
        assert_eq!(f.engine.stats().passes, 1);
    }

    #[tokio::test]
    async fn concurrent_drains_coalesce() {
        let f = fixture(ScriptedHandler::new().with_delay(Duration::from_millis(20)));
        for _ in 0..3 {
            f.engine.enqueue(draft("alert", Priority::Medium)).unwrap();
        }

        let first = {
            let engine = Arc::clone(&f.engine);
            tokio::spawn(async move { engine.drain().await.unwrap() })
        };
        // Give the first drain time to take its snapshot.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = f.engine.drain().await.unwrap();
        let first = first.await.unwrap();

        // The concurrent call coalesced; every action dispatched once.
        assert!(second.is_empty());
        assert_eq!(first.processed, 3);
        assert_eq!(f.handler.call_count(), 3);
    }

    #[tokio::test]
    async fn trigger_during_final_pass_gets_its_own_pass() {
        let f = fixture(ScriptedHandler::new().with_delay(Duration::from_millis(20)));
        let id = f.engine.enqueue(draft("alert", Priority::Medium)).unwrap();
        f.handler
            .push_outcome(DispatchOutcome::Recoverable("timeout".into()));

        let first = {
            let engine = Arc::clone(&f.engine);
            tokio::spawn(async move { engine.drain().await.unwrap() })
        };
        // Coalesce a trigger while the only pass is in flight. It must
        // not be lost when that pass turns out to be the last one.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = f.engine.drain().await.unwrap();
        let first = first.await.unwrap();

        assert!(second.is_empty());
        // Pass 1 failed recoverably and retained the action; the
        // coalesced trigger forced pass 2, which dispatched it again.
        assert_eq!(first.processed, 2);
        assert_eq!(first.recoverable_retried, 1);
        assert_eq!(f.handler.call_count(), 2);
        assert!(f.engine.queue().get(id).is_none());
        assert_eq!(f.engine.stats().passes, 2);
    }

    #[tokio::test]
    async fn enqueue_checks_required_fields_of_registered_handler() {
        let f = fixture(ScriptedHandler::new().with_required_fields(&["entity_id", "site"]));

        let err = f
            .engine
            .enqueue(draft("alert", Priority::High))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("site"));
        assert!(f.engine.queue().is_empty());

        // Unregistered types skip the check.
        let ok = ActionDraft::new(ActionType::new("unregistered").unwrap(), payload(), Priority::Low);
        assert!(f.engine.enqueue(ok).is_ok());
    }

    #[tokio::test]
    async fn drain_report_event_fires_per_pass() {
        let f = fixture(ScriptedHandler::new());
        let rx = f.engine.queue().events().subscribe();
        f.engine.enqueue(draft("alert", Priority::High)).unwrap();
        f.engine.drain().await.unwrap();

        let reports: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e.event {
                QueueEvent::DrainCompleted { report } => Some(report),
                _ => None,
            })
            .collect();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].processed, 1);
    }
}
