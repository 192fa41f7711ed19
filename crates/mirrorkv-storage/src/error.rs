//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error (file not found, permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid key format
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Lock was poisoned (another thread panicked while holding the lock)
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Filesystem watcher error
    #[error("Watch error: {0}")]
    Watch(String),
}

impl StorageError {
    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }
}

impl From<notify::Error> for StorageError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}
