//! Emergency cache of high-value reference data.
//!
//! While online the cache periodically pulls a bounded read-only
//! snapshot (contact lists, currently-active critical records) from an
//! injected source, so dispatch handlers and the UI still have
//! something to work from during an outage. A snapshot is replaced
//! atomically; a failed fetch keeps the previous one.

use crate::error::EngineResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use sluice_core::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Provider of reference-data snapshots.
#[async_trait]
pub trait SnapshotSource<T>: Send + Sync {
    /// Fetches a fresh snapshot from the remote service.
    async fn fetch(&self) -> EngineResult<T>;
}

struct Slot<T> {
    data: Arc<T>,
    last_synced_at: Timestamp,
}

/// Periodically refreshed read-only snapshot usable while offline.
pub struct EmergencyCache<T> {
    source: Arc<dyn SnapshotSource<T>>,
    slot: RwLock<Option<Slot<T>>>,
    refresh_interval: Duration,
}

impl<T: Send + Sync> EmergencyCache<T> {
    /// Creates an empty cache over `source`.
    ///
    /// `refresh_interval` drives both the refresh ticker and the
    /// staleness rule: a snapshot older than twice the interval is
    /// flagged stale.
    #[must_use]
    pub fn new(source: Arc<dyn SnapshotSource<T>>, refresh_interval: Duration) -> Self {
        Self {
            source,
            slot: RwLock::new(None),
            refresh_interval,
        }
    }

    /// Fetches and installs a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previously installed snapshot, if
    /// any, stays in place.
    pub async fn refresh(&self) -> EngineResult<()> {
        let data = self.source.fetch().await?;
        let now = Timestamp::now();
        *self.slot.write() = Some(Slot {
            data: Arc::new(data),
            last_synced_at: now,
        });
        debug!(last_synced_at = %now, "emergency cache refreshed");
        Ok(())
    }

    /// Current snapshot and its staleness as of `now`.
    ///
    /// Callers may use a stale snapshot but can detect and flag it.
    #[must_use]
    pub fn get_at(&self, now: Timestamp) -> Option<(Arc<T>, bool)> {
        let slot = self.slot.read();
        slot.as_ref().map(|s| {
            let stale = now.since(s.last_synced_at) > self.refresh_interval * 2;
            (Arc::clone(&s.data), stale)
        })
    }

    /// Current snapshot and staleness as of the wall clock.
    #[must_use]
    pub fn get(&self) -> Option<(Arc<T>, bool)> {
        self.get_at(Timestamp::now())
    }

    /// When the current snapshot was fetched, if one is installed.
    #[must_use]
    pub fn last_synced_at(&self) -> Option<Timestamp> {
        self.slot.read().as_ref().map(|s| s.last_synced_at)
    }
}
