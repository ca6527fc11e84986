//! Persistence port for queued actions.
//!
//! The queue owns exactly one store and is its single writer; every other
//! component requests mutations through the queue's API. The port is
//! synchronous by design: dispatch is the only point a drain pass may
//! await, so persistence happens inline under the queue's critical
//! section.

use crate::action::QueuedAction;
use crate::error::CoreResult;
use crate::types::ActionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Durable storage for the set of queued actions.
///
/// # Crash consistency
///
/// - A `save` that returned `Ok` must survive a crash.
/// - A `delete` that returned `Ok` must not resurrect the action after a
///   crash.
/// - `save` on an existing id replaces the stored record (retry
///   bookkeeping is persisted through it).
pub trait ActionStore: Send {
    /// Reads every persisted action, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn load(&mut self) -> CoreResult<Vec<QueuedAction>>;

    /// Persists an action, replacing any prior record with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot be made durable.
    fn save(&mut self, action: &QueuedAction) -> CoreResult<()>;

    /// Removes the persisted record for `id`. Unknown ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be made durable.
    fn delete(&mut self, id: ActionId) -> CoreResult<()>;
}

/// An in-memory [`ActionStore`] for tests and ephemeral queues.
///
/// Clones share the same underlying map, so a test can keep one handle,
/// drop the queue, and hand the other handle to a fresh queue to simulate
/// a process restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    actions: Arc<Mutex<HashMap<ActionId, QueuedAction>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.lock().len()
    }

    /// True when nothing is persisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.lock().is_empty()
    }

    /// Returns the persisted record for `id`, if any.
    #[must_use]
    pub fn get(&self, id: ActionId) -> Option<QueuedAction> {
        self.actions.lock().get(&id).cloned()
    }
}

impl ActionStore for MemoryStore {
    fn load(&mut self) -> CoreResult<Vec<QueuedAction>> {
        Ok(self.actions.lock().values().cloned().collect())
    }

    fn save(&mut self, action: &QueuedAction) -> CoreResult<()> {
        self.actions.lock().insert(action.id, action.clone());
        Ok(())
    }

    fn delete(&mut self, id: ActionId) -> CoreResult<()> {
        self.actions.lock().remove(&id);
        Ok(())
    }
}
