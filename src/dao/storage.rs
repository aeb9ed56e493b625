use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The write would put a second non-terminal timer into an occupied
    /// `(committee, type)` slot.
    #[error("an active `{timer_type}` timer already exists for committee `{committee_id}`")]
    Conflict {
        committee_id: String,
        timer_type: String,
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

    /// Construct a slot conflict for the given committee and timer type.
    pub fn conflict(committee_id: impl Into<String>, timer_type: impl Into<String>) -> Self {
        StorageError::Conflict {
            committee_id: committee_id.into(),
            timer_type: timer_type.into(),
        }
    }
}
