//! Error types for the queue layer.

use crate::types::ActionId;
use thiserror::Error;

/// Result type for queue-layer operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in queue-layer operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A malformed enqueue request; the action was never created.
    #[error("validation error: {message}")]
    Validation {
        /// What made the request invalid.
        message: String,
    },

    /// Payload exceeds the configured size cap.
    #[error("payload too large: {size} bytes exceeds limit of {max}")]
    PayloadTooLarge {
        /// Actual payload size in bytes.
        size: usize,
        /// Configured limit in bytes.
        max: usize,
    },

    /// Log backend error.
    #[error("storage error: {0}")]
    Storage(#[from] sluice_storage::StorageError),

    /// CBOR encoding or decoding failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// The journal is corrupted beyond its recoverable tail.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A journal frame failed its checksum.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Checksum recorded in the frame header.
        expected: u32,
        /// Checksum computed over the frame payload.
        actual: u32,
    },

    /// The journal header is missing or from an unknown format version.
    #[error("invalid journal format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// No queued action with the given id.
    #[error("action not found: {id}")]
    ActionNotFound {
        /// The id that was looked up.
        id: ActionId,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// True for errors produced by rejecting an enqueue request.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::PayloadTooLarge { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_helper_builds_variant() {
        let err = CoreError::validation("missing field");
        assert!(err.is_validation());
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn payload_too_large_is_validation() {
        let err = CoreError::PayloadTooLarge {
            size: 300,
            max: 256,
        };
        assert!(err.is_validation());
    }

    #[test]
    fn storage_error_converts() {
        let storage = sluice_storage::StorageError::ReadPastEnd {
            offset: 0,
            len: 8,
            size: 4,
        };
        let err: CoreError = storage.into();
        assert!(matches!(err, CoreError::Storage(_)));
        assert!(!err.is_validation());
    }
}
