//! Online/offline tracking and critical-mode escalation.
//!
//! The monitor never performs network calls. The host environment feeds
//! it a boolean signal over a `watch` channel; the monitor applies the
//! transitions, arms the critical-mode deadline while offline, and
//! fires a drain when connectivity returns. All transition logic lives
//! in pure functions of an explicit `now` so the timing rules are
//! testable without timers.

use crate::engine::SyncEngine;
use parking_lot::Mutex;
use sluice_core::{ActionStore, EventBus, QueueEvent, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The three connectivity states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    /// Connected; drains may run.
    Online,
    /// Disconnected for less than the critical threshold.
    Offline,
    /// Continuously offline past the critical threshold.
    OfflineCritical,
}

/// Snapshot of the monitor's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    /// True while connected.
    pub is_online: bool,
    /// True once an outage crosses the critical threshold; cleared
    /// immediately on reconnect.
    pub critical_mode: bool,
    /// When the current outage began, if offline.
    pub offline_since: Option<Timestamp>,
}

impl ConnectivityState {
    /// Collapses the flags into a [`ConnectivityStatus`].
    #[must_use]
    pub const fn status(&self) -> ConnectivityStatus {
        if self.is_online {
            ConnectivityStatus::Online
        } else if self.critical_mode {
            ConnectivityStatus::OfflineCritical
        } else {
            ConnectivityStatus::Offline
        }
    }
}

/// Result of feeding one signal edge into the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalChange {
    /// Connectivity returned; a drain should be triggered.
    WentOnline,
    /// Connectivity was lost.
    WentOffline,
    /// The signal repeated the current state.
    NoChange,
}

struct HandleInner {
    state: Mutex<ConnectivityState>,
    threshold: Duration,
    events: Arc<EventBus>,
}

/// Shared, cloneable view of the connectivity state.
///
/// The background task and any caller-side probe feed the same handle;
/// the sync engine consults it before starting a drain.
#[derive(Clone)]
pub struct ConnectivityHandle {
    inner: Arc<HandleInner>,
}

impl ConnectivityHandle {
    /// Creates a handle that starts online.
    #[must_use]
    pub fn new(threshold: Duration, events: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                state: Mutex::new(ConnectivityState {
                    is_online: true,
                    critical_mode: false,
                    offline_since: None,
                }),
                threshold,
                events,
            }),
        }
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        *self.inner.state.lock()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectivityStatus {
        self.state().status()
    }

    /// True while connected.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state().is_online
    }

    /// Applies one signal edge as of `now`.
    ///
    /// A reconnect clears critical mode immediately, however long the
    /// outage lasted, emitting `CriticalModeExited` if it was set. A
    /// disconnect records when the outage began.
    pub fn apply_signal(&self, online: bool, now: Timestamp) -> SignalChange {
        let mut exited_critical = false;
        let change = {
            let mut state = self.inner.state.lock();
            if online && !state.is_online {
                exited_critical = state.critical_mode;
                *state = ConnectivityState {
                    is_online: true,
                    critical_mode: false,
                    offline_since: None,
                };
                SignalChange::WentOnline
            } else if !online && state.is_online {
                *state = ConnectivityState {
                    is_online: false,
                    critical_mode: false,
                    offline_since: Some(now),
                };
                SignalChange::WentOffline
            } else {
                SignalChange::NoChange
            }
        };

        match change {
            SignalChange::WentOnline => {
                info!("connectivity restored");
                if exited_critical {
                    self.inner.events.emit(QueueEvent::CriticalModeExited);
                }
            }
            SignalChange::WentOffline => info!("connectivity lost"),
            SignalChange::NoChange => {}
        }
        change
    }

    /// Escalates to critical mode if the outage has lasted at least the
    /// threshold as of `now`. Returns true when the escalation fired.
    pub fn check_critical(&self, now: Timestamp) -> bool {
        let offline_since = {
            let mut state = self.inner.state.lock();
            if state.is_online || state.critical_mode {
                return false;
            }
            let Some(since) = state.offline_since else {
                return false;
            };
            if now.since(since) < self.inner.threshold {
                return false;
            }
            state.critical_mode = true;
            since
        };

        warn!(%offline_since, "offline past threshold, entering critical mode");
        self.inner
            .events
            .emit(QueueEvent::CriticalModeEntered { offline_since });
        true
    }

    /// Escalates on an armed deadline whose timer has fired.
    ///
    /// Evaluates [`ConnectivityHandle::check_critical`] at the later of
    /// the wall clock and the armed deadline, so a timer driven by a
    /// mocked clock still escalates exactly at the threshold.
    pub fn deadline_fired(&self) -> bool {
        let deadline = {
            let state = self.inner.state.lock();
            if state.is_online || state.critical_mode {
                return false;
            }
            let Some(since) = state.offline_since else {
                return false;
            };
            since.plus(self.inner.threshold)
        };
        self.check_critical(deadline.max(Timestamp::now()))
    }

    /// Time remaining until the critical deadline, if one is armed.
    #[must_use]
    pub fn critical_deadline_in(&self, now: Timestamp) -> Option<Duration> {
        let state = self.inner.state.lock();
        if state.is_online || state.critical_mode {
            return None;
        }
        let since = state.offline_since?;
        let elapsed = now.since(since);
        Some(self.inner.threshold.saturating_sub(elapsed))
    }
}

/// Background task binding a connectivity signal to the sync engine.
pub struct ConnectivityMonitor;

impl ConnectivityMonitor {
    /// Spawns the monitor loop.
    ///
    /// The loop observes `signal`, escalates to critical mode on its
    /// own deadline timer, and fire-and-forgets a drain whenever
    /// connectivity returns. It exits on `shutdown` or when the signal
    /// sender is dropped.
    pub fn spawn<S: ActionStore + 'static>(
        handle: ConnectivityHandle,
        mut signal: watch::Receiver<bool>,
        engine: Arc<SyncEngine<S>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            // Adopt whatever the signal already says.
            let initial = *signal.borrow_and_update();
            if handle.apply_signal(initial, Timestamp::now()) == SignalChange::WentOnline {
                engine.trigger_drain();
            }

            loop {
                let deadline = handle.critical_deadline_in(Timestamp::now());
                tokio::select! {
                    _ = shutdown.changed() => {
                        debug!("connectivity monitor shutting down");
                        break;
                    }
                    changed = signal.changed() => {
                        if changed.is_err() {
                            debug!("connectivity signal dropped, monitor exiting");
                            break;
                        }
                        let online = *signal.borrow_and_update();
                        if handle.apply_signal(online, Timestamp::now())
                            == SignalChange::WentOnline
                        {
                            engine.trigger_drain();
                        }
                    }
                    () = sleep_until_deadline(deadline) => {
                        handle.deadline_fired();
                    }
                }
            }
        })
    }
}

/// Sleeps out the critical-mode deadline, or forever when none is armed.
async fn sleep_until_deadline(deadline: Option<Duration>) {
    match deadline {
        Some(remaining) => tokio::time::sleep(remaining).await,
        None => std::future::pending().await,
    }
}
