//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors produced by log backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read reached past the end of the log.
    #[error("read past end: offset {offset} + len {len} exceeds size {size}")]
    ReadPastEnd {
        /// Requested read offset.
        offset: u64,
        /// Requested read length.
        len: usize,
        /// Current log size.
        size: u64,
    },

    /// A truncate requested a size larger than the current log.
    #[error("cannot truncate to {requested}: log is only {size} bytes")]
    TruncatePastEnd {
        /// Requested new size.
        requested: u64,
        /// Current log size.
        size: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_past_end_message() {
        let err = StorageError::ReadPastEnd {
            offset: 10,
            len: 5,
            size: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 10"));
        assert!(msg.contains("size 12"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: StorageError = io.into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
