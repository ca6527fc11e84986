//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync-layer operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the sync layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A queue-layer operation failed.
    #[error("queue error: {0}")]
    Core(#[from] sluice_core::CoreError),

    /// The emergency cache could not fetch a fresh snapshot.
    #[error("cache refresh failed: {message}")]
    CacheRefresh {
        /// Description of the failure.
        message: String,
    },
}

impl EngineError {
    /// Creates a cache refresh error.
    pub fn cache_refresh(message: impl Into<String>) -> Self {
        Self::CacheRefresh {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::CoreError;

    #[test]
    fn core_error_converts() {
        let err: EngineError = CoreError::validation("bad payload").into();
        assert!(matches!(err, EngineError::Core(_)));
        assert!(err.to_string().contains("bad payload"));
    }

    #[test]
    fn cache_refresh_helper() {
        let err = EngineError::cache_refresh("remote unavailable");
        assert!(err.to_string().contains("remote unavailable"));
    }
}
