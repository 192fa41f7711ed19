//! Store error types.

use mirrorkv_storage::StorageError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed failure from a pluggable encode/decode function.
pub type CodecFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during store operations.
///
/// Whether a caller sees these or they are only logged is governed by the
/// engine's `silent` option; decode failures are recovered from in place
/// and never returned to callers regardless of it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend read failed
    #[error("Backend read failed for key {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Backend write or removal failed
    #[error("Backend write failed for key {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Value could not be encoded to raw text
    #[error("Encode failed for key {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: CodecFailure,
    },

    /// Persisted raw text could not be decoded
    #[error("Decode failed for key {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: CodecFailure,
    },
}

impl StoreError {
    pub(crate) fn read(key: impl Into<String>, source: StorageError) -> Self {
        Self::Read {
            key: key.into(),
            source,
        }
    }

    pub(crate) fn write(key: impl Into<String>, source: StorageError) -> Self {
        Self::Write {
            key: key.into(),
            source,
        }
    }

    pub(crate) fn encode(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Encode {
            key: key.into(),
            source: source.into(),
        }
    }

    pub(crate) fn decode(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Decode {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Key the failing operation was for.
    pub fn key(&self) -> &str {
        match self {
            Self::Read { key, .. }
            | Self::Write { key, .. }
            | Self::Encode { key, .. }
            | Self::Decode { key, .. } => key,
        }
    }

    /// Whether this kind of error is ever returned to callers.
    ///
    /// Decode failures are not: corrupt data is discarded or marked
    /// known-bad, logged, and the operation continues.
    pub fn propagates(&self) -> bool {
        !matches!(self, Self::Decode { .. })
    }
}
