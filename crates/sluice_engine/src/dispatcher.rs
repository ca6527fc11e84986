//! Per-action-type dispatch handlers.
//!
//! The queue core never talks to the remote service; it hands each
//! action to a [`Dispatcher`], a capability map from action type to an
//! injected [`ActionHandler`]. Concrete handlers (send an alert email,
//! insert a check-in record) live entirely outside this workspace.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sluice_core::{ActionId, ActionType, QueuedAction};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What a handler made of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The remote accepted the action.
    Success,
    /// Transient failure; the action is worth retrying.
    Recoverable(String),
    /// The remote rejected the payload itself; never retry.
    Permanent(String),
}

/// A handler for one action type.
///
/// `dispatch` is the only point a drain pass may await; it performs the
/// actual remote call and classifies its result. Handlers must be
/// shareable across drains.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Attempts to deliver the action to the remote service.
    async fn dispatch(&self, action: &QueuedAction) -> DispatchOutcome;

    /// Payload keys that must be present at enqueue time.
    ///
    /// Checked only when the handler is already registered when the
    /// enqueue happens; a missing key fails the enqueue with a
    /// validation error.
    fn required_fields(&self) -> &[&str] {
        &[]
    }
}

/// Registry of handlers keyed by action type.
#[derive(Default)]
pub struct Dispatcher {
    handlers: RwLock<HashMap<ActionType, Arc<dyn ActionHandler>>>,
}

impl Dispatcher {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `action_type`, replacing any previous
    /// registration.
    pub fn register(&self, action_type: ActionType, handler: Arc<dyn ActionHandler>) {
        debug!(%action_type, "handler registered");
        self.handlers.write().insert(action_type, handler);
    }

    /// True if a handler is registered for the type.
    #[must_use]
    pub fn has_handler(&self, action_type: &ActionType) -> bool {
        self.handlers.read().contains_key(action_type)
    }

    /// Required payload keys for the type, if a handler is registered.
    #[must_use]
    pub fn required_fields(&self, action_type: &ActionType) -> Option<Vec<String>> {
        let handlers = self.handlers.read();
        let handler = handlers.get(action_type)?;
        Some(
            handler
                .required_fields()
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
        )
    }

    /// Dispatches one action through its registered handler.
    ///
    /// An action whose type has no handler fails permanently: retrying
    /// cannot make a handler appear mid-drain, and the eviction is
    /// surfaced like any other terminal failure.
    pub async fn dispatch(&self, action: &QueuedAction) -> DispatchOutcome {
        // Clone the handler out so the lock is not held across the await.
        let handler = self.handlers.read().get(&action.action_type).cloned();
        match handler {
            Some(handler) => handler.dispatch(action).await,
            None => DispatchOutcome::Permanent(format!(
                "no handler registered for action type {:?}",
                action.action_type.as_str()
            )),
        }
    }
}

/// A scripted [`ActionHandler`] for tests.
///
/// Outcomes are served from a queue, falling back to `Success` when the
/// script runs dry; every dispatched action id is recorded.
#[derive(Default)]
pub struct ScriptedHandler {
    script: Mutex<VecDeque<DispatchOutcome>>,
    calls: Mutex<Vec<ActionId>>,
    required: Vec<&'static str>,
    delay: Option<Duration>,
}

impl ScriptedHandler {
    /// Creates a handler that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares payload keys required at enqueue time.
    #[must_use]
    pub fn with_required_fields(mut self, fields: &[&'static str]) -> Self {
        self.required = fields.to_vec();
        self
    }

    /// Makes every dispatch sleep first, to widen race windows in
    /// single-flight tests.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues the outcome for the next unscripted dispatch.
    pub fn push_outcome(&self, outcome: DispatchOutcome) {
        self.script.lock().push_back(outcome);
    }

    /// Ids dispatched so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<ActionId> {
        self.calls.lock().clone()
    }

    /// Number of dispatches so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ActionHandler for ScriptedHandler {
    async fn dispatch(&self, action: &QueuedAction) -> DispatchOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(action.id);
        self.script
            .lock()
            .pop_front()
            .unwrap_or(DispatchOutcome::Success)
    }

    fn required_fields(&self) -> &[&str] {
        &self.required
    }
}
