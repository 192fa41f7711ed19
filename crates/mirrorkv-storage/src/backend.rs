//! The persistent backend contract.
//!
//! Backends store raw text per key. Decoding raw text into values is the
//! engine's concern; backends never interpret what they store.

use crate::StorageResult;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BACKEND_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one backend handle.
///
/// Each handle opened onto a storage domain gets its own id. Change events
/// carry the id of the handle that authored the write, so engines can ignore
/// notifications caused by their own backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendId(u64);

impl BackendId {
    /// Allocate a fresh process-unique id.
    pub fn next() -> Self {
        Self(NEXT_BACKEND_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend-{}", self.0)
    }
}

/// A trait for synchronous raw-text storage backends.
///
/// Keys are opaque strings; a backend may reject keys it cannot represent
/// (see [`crate::FileBackend`]). All operations are synchronous and safe to
/// call from any thread.
pub trait StorageBackend: Send + Sync {
    /// Stable identity of this backend handle.
    fn id(&self) -> BackendId;

    /// Read the raw text stored under `key`.
    ///
    /// Returns `None` if the key doesn't exist.
    fn read(&self, key: &str) -> StorageResult<Option<String>>;

    /// Write raw text under `key`, replacing any previous value.
    fn write(&self, key: &str, raw: &str) -> StorageResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Check if a key exists.
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.read(key)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_ids_are_unique() {
        let a = BackendId::next();
        let b = BackendId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn backend_id_displays_with_prefix() {
        let id = BackendId::next();
        assert!(id.to_string().starts_with("backend-"));
    }
}
