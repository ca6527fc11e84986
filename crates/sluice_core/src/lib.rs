//! # Sluice Core
//!
//! The queue layer of sluice: a client-resident offline action queue
//! that keeps accepting state-changing operations while disconnected
//! from its backing service and reconciles them once connectivity
//! returns.
//!
//! This crate owns the data model and every queue-side guarantee:
//! - Durable enqueue: an action is persisted before `enqueue` returns
//! - Total drain order: priority descending, enqueue time ascending,
//!   with a persisted sequence breaking timestamp ties
//! - Retry bookkeeping updated **in place**, preserving FIFO fairness
//!   within a priority band
//! - Terminal evictions (retry exhaustion, expiry, permanent rejection)
//!   are never silent: each emits an event carrying id, type and reason
//! - `max_retries` is fixed at creation and never recomputed
//!
//! The sync layer lives in `sluice_engine`; it drives this queue through
//! [`ActionQueue`]'s API and is the only component that may await.
//!
//! ## Components
//!
//! - [`ActionQueue`] - the ordered pending set over an [`ActionStore`]
//! - [`JournalStore`] - durable store: CRC-framed CBOR log with
//!   torn-tail recovery and compaction
//! - [`MemoryStore`] - in-memory store for tests and ephemeral queues
//! - [`RetentionPolicy`] - pure stale-entry eviction rule
//! - [`EventBus`] - sequenced event fan-out with a bounded history
//!
//! ## Example
//!
//! ```rust
//! use sluice_core::{
//!     ActionDraft, ActionQueue, ActionType, Config, MemoryStore, Payload, Priority,
//! };
//! use ciborium::value::Value;
//!
//! let queue = ActionQueue::new(MemoryStore::new(), Config::default());
//! let payload = Payload::from_map(vec![("entity_id", Value::Text("e-1".into()))]).unwrap();
//! let draft = ActionDraft::new(ActionType::new("alert").unwrap(), payload, Priority::Critical);
//!
//! let id = queue.enqueue(draft).unwrap();
//! assert_eq!(queue.snapshot_ordered()[0].id, id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod config;
mod error;
mod events;
mod journal;
mod queue;
mod retention;
mod store;
mod types;

pub use action::{ActionDraft, Payload, QueuedAction};
pub use config::{Config, RetryTable};
pub use error::{CoreError, CoreResult};
pub use events::{
    DrainReport, EventBus, FailureReason, QueueEvent, SequencedEvent,
};
pub use journal::{
    compute_crc32, JournalCheck, JournalStats, JournalStore, JOURNAL_MAGIC, JOURNAL_VERSION,
};
pub use queue::{ActionQueue, QueueStats, RetryDisposition};
pub use retention::{EvictionReason, RetentionPolicy, SweepOutcome};
pub use store::{ActionStore, MemoryStore};
pub use types::{ActionId, ActionType, Priority, Timestamp, MAX_ACTION_TYPE_LEN};
