//! # Sluice Engine
//!
//! The sync layer of sluice: drains the offline action queue against
//! per-action-type handlers once connectivity returns.
//!
//! This crate provides:
//! - [`Dispatcher`] - capability map from action type to an injected
//!   [`ActionHandler`]
//! - [`SyncEngine`] - single-flight drain state machine over an
//!   `ActionQueue`
//! - [`ConnectivityMonitor`] - online/offline tracking with
//!   critical-mode escalation after an extended outage
//! - [`EmergencyCache`] - periodically refreshed read-only reference
//!   snapshot usable while offline
//! - [`TaskSet`] and the ticker spawners for retention sweeps and cache
//!   refreshes
//!
//! ## Key Invariants
//!
//! - Exactly one drain is in flight at a time; concurrent triggers
//!   coalesce into a follow-up pass
//! - A drain pass dispatches a fixed ordered snapshot; actions enqueued
//!   mid-pass wait for the next pass
//! - `ActionHandler::dispatch` is the only await point in a pass
//! - A connectivity loss never cancels an in-flight pass; dispatches
//!   fail naturally and classify as recoverable
//! - Critical mode engages at exactly the configured threshold of
//!   continuous offline time and clears immediately on reconnect

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod connectivity;
mod dispatcher;
mod engine;
mod error;
mod tasks;

pub use cache::{EmergencyCache, SnapshotSource};
pub use connectivity::{
    ConnectivityHandle, ConnectivityMonitor, ConnectivityState, ConnectivityStatus, SignalChange,
};
pub use dispatcher::{ActionHandler, DispatchOutcome, Dispatcher, ScriptedHandler};
pub use engine::{EngineStats, SyncEngine};
pub use error::{EngineError, EngineResult};
pub use tasks::{spawn_cache_ticker, spawn_gc_ticker, TaskSet};
