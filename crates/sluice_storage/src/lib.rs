//! # Sluice Storage
//!
//! Append-only log backends for the sluice action journal.
//!
//! This crate provides the lowest-level storage abstraction in the
//! workspace. Backends are **opaque byte stores**: the journal layer in
//! `sluice_core` owns all framing, checksumming and record interpretation,
//! and a backend only ever sees the resulting bytes.
//!
//! ## Design Principles
//!
//! - Backends expose a single growable byte log (read, append, truncate, replace)
//! - No knowledge of journal frames, records, or queued actions
//! - Must be `Send` so a queue owning one can move across threads
//! - Durability is explicit: nothing is guaranteed until `sync` returns
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For testing and ephemeral queues
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use sluice_storage::{LogBackend, MemoryBackend};
//!
//! let mut backend = MemoryBackend::new();
//! let offset = backend.append(b"frame bytes").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"frame bytes");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::LogBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::MemoryBackend;
