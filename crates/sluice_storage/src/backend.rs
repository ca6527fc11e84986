//! Log backend trait definition.

use crate::error::StorageResult;

/// A low-level append-only log backend.
///
/// Backends are **opaque byte stores**. They provide simple operations for
/// reading, appending, truncating and syncing a single growable log. The
/// journal layer owns all frame interpretation - backends do not understand
/// records, checksums, or queued actions.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `sync` ensures all appended data and metadata survive a crash
/// - `truncate` discards everything at and after the given offset
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait LogBackend: Send {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The offset is beyond the current size
    /// - The read would extend beyond the current size
    /// - An I/O error occurs
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the log.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Flushes all pending writes to the OS.
    ///
    /// Weaker than [`LogBackend::sync`]: buffered data is handed to the
    /// operating system but may not yet be on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the log in bytes.
    ///
    /// This is the offset where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// After this returns successfully, previously appended data is
    /// guaranteed to survive process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the log to the given size.
    ///
    /// Used by journal recovery to drop a torn final frame.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `new_size` is greater than the current size
    /// - The truncation fails
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the entire log with the given bytes.
    ///
    /// Used by journal compaction. Either the old contents or the new
    /// contents survive a crash, never a partial mix.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement cannot be made durable.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;
}
