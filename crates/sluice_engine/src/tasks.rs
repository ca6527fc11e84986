//! Background ticker tasks.
//!
//! The retention sweep and the emergency-cache refresh run on
//! independent intervals, each watching the same shutdown channel. A
//! [`TaskSet`] owns that channel and joins every registered task on
//! shutdown.

use crate::cache::EmergencyCache;
use crate::connectivity::ConnectivityHandle;
use sluice_core::{ActionQueue, ActionStore, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Owns the shutdown channel and the background tasks bound to it.
pub struct TaskSet {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl TaskSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// A receiver tasks can select on to learn about shutdown.
    #[must_use]
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Adds a task to be joined on shutdown.
    pub fn register(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no tasks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals shutdown and waits for every registered task to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        debug!("background tasks stopped");
    }
}

impl Default for TaskSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the periodic retention sweep.
///
/// Returns `None` when `interval` is zero (the ticker is disabled).
/// Evictions route through the queue, so they are persisted and
/// surfaced as terminal-failure events like any other.
pub fn spawn_gc_ticker<S: ActionStore + 'static>(
    queue: Arc<ActionQueue<S>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; reload already swept, skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = queue.sweep_now(Timestamp::now()) {
                        warn!("retention sweep failed: {e}");
                    }
                }
            }
        }
    }))
}

/// Spawns the periodic emergency-cache refresh.
///
/// Refreshes only while online; a failed fetch is logged and the
/// previous snapshot stays in place. Returns `None` when `interval` is
/// zero.
pub fn spawn_cache_ticker<T: Send + Sync + 'static>(
    cache: Arc<EmergencyCache<T>>,
    connectivity: ConnectivityHandle,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if !connectivity.is_online() {
                        continue;
                    }
                    if let Err(e) = cache.refresh().await {
                        warn!("emergency cache refresh failed: {e}");
                    }
                }
            }
        }
    }))
}
