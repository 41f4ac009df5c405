use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or the operation failed mid-flight.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failing operation.
        message: String,
        /// Backend-specific cause.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The backend did not answer within the configured I/O deadline.
    #[error("storage operation timed out while {operation}")]
    Timeout {
        /// Description of the operation that ran out of time.
        operation: &'static str,
    },
    /// A uniqueness constraint rejected the write.
    #[error("storage conflict: {message}")]
    Conflict {
        /// Description of the violated constraint.
        message: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
