//! In-memory backend implementation.

use crate::{BackendId, StorageBackend, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory raw-text backend.
///
/// Data lives in a shared map and is not persistent. Cloning yields the same
/// handle (same identity, same data); [`MemoryBackend::handle`] yields a new
/// identity onto the same data, which models another execution context
/// attached to the same storage domain.
#[derive(Clone)]
pub struct MemoryBackend {
    data: Arc<RwLock<HashMap<String, String>>>,
    id: BackendId,
}

impl MemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            id: BackendId::next(),
        }
    }

    /// Create another handle onto the same data with its own identity.
    ///
    /// Writes through the new handle carry the new id, so engines using this
    /// handle treat writes from the original as external and vice versa.
    pub fn handle(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            id: BackendId::next(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for MemoryBackend {
    fn id(&self) -> BackendId {
        self.id
    }

    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        Ok(data.get(key).cloned())
    }

    fn write(&self, key: &str, raw: &str) -> StorageResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        data.insert(key.to_string(), raw.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        data.remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;
        Ok(data.contains_key(key))
    }
}
