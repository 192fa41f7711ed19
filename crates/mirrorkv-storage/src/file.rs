//! File-based backend implementation.
//!
//! Stores each key as a separate raw-text file: key `user-settings` maps to
//! `<base>/user-settings.kv`. Writes go through a temp file and a rename so
//! watchers and other processes never observe partial contents.

use crate::{BackendId, StorageBackend, StorageError, StorageResult};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// File extension for stored keys.
const FILE_EXT: &str = "kv";

/// Longest accepted key, in bytes. Keeps the derived file name within
/// common filesystem name limits with room for the temp suffix.
const MAX_KEY_LEN: usize = 200;

/// File-per-key raw-text backend.
///
/// Cloning yields the same handle (same identity). Opening the same
/// directory again yields an independent handle with its own identity,
/// the way a second process attached to the same domain would.
#[derive(Clone)]
pub struct FileBackend {
    inner: Arc<FileBackendInner>,
}

struct FileBackendInner {
    base_path: PathBuf,
    id: BackendId,
    /// Last change that landed through this handle per key: the raw text
    /// written, or `None` for a removal. [`FileBackend::observe`] consults
    /// it to recognize echoes of our own writes.
    shadow: RwLock<HashMap<String, Option<String>>>,
}

impl FileBackend {
    /// Open a backend rooted at `base_path`, creating the directory if
    /// needed.
    pub fn open(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            inner: Arc::new(FileBackendInner {
                base_path,
                id: BackendId::next(),
                shadow: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Probe whether a backend can be opened at `base_path`.
    ///
    /// Returns `None` (with a warning) when the directory cannot be created
    /// or accessed, letting callers fall back to a no-op store.
    pub fn detect(base_path: impl Into<PathBuf>) -> Option<Self> {
        let base_path = base_path.into();
        match Self::open(&base_path) {
            Ok(backend) => Some(backend),
            Err(err) => {
                warn!(path = %base_path.display(), error = %err, "Storage directory unavailable");
                None
            }
        }
    }

    /// The default per-user storage directory, if one can be determined.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_local_dir().map(|p| p.join("mirrorkv"))
    }

    /// Directory this backend stores its files under.
    pub fn base_path(&self) -> &Path {
        &self.inner.base_path
    }

    /// Get the file path for a key.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.inner.base_path.join(format!("{key}.{FILE_EXT}")))
    }

    /// Recover the key a storage file corresponds to, if it is one.
    pub(crate) fn path_to_key(path: &Path) -> Option<&str> {
        let name = path.file_name()?.to_str()?;
        name.strip_suffix(&format!(".{FILE_EXT}"))
    }

    /// Current contents of `key`, paired with whether they match the last
    /// change made through this handle.
    ///
    /// The read happens under the shadow lock, so a write in progress on
    /// another thread is never half-observed. A foreign value drops the
    /// remembered entry; only the next own write re-arms suppression.
    pub(crate) fn observe(&self, key: &str) -> StorageResult<(Option<String>, bool)> {
        let path = self.key_to_path(key)?;
        let mut shadow = self
            .inner
            .shadow
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        let raw = match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(StorageError::Io(e)),
        };

        let own = match shadow.get(key) {
            Some(last) if last.as_deref() == raw.as_deref() => true,
            Some(_) => {
                shadow.remove(key);
                false
            }
            None => false,
        };
        Ok((raw, own))
    }
}

impl StorageBackend for FileBackend {
    fn id(&self) -> BackendId {
        self.inner.id
    }

    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Reading from storage");

        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn write(&self, key: &str, raw: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Writing to storage");

        fs::create_dir_all(&self.inner.base_path)?;

        // Held across the mutation, so a concurrent observe sees either
        // the old file with the old entry or the new file with the new
        // one. The entry is recorded only once the rename lands; a failed
        // write must not be remembered as ours.
        let mut shadow = self
            .inner
            .shadow
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        // Write atomically (write to temp file, then rename)
        let temp_path = self.inner.base_path.join(format!("{key}.{FILE_EXT}.tmp"));
        fs::write(&temp_path, raw)?;
        fs::rename(&temp_path, &path)?;
        shadow.insert(key.to_string(), Some(raw.to_string()));

        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        debug!(path = %path.display(), "Removing from storage");

        let mut shadow = self
            .inner
            .shadow
            .write()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::Io(e)),
        }
        shadow.insert(key.to_string(), None);

        Ok(())
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(path.exists())
    }
}

/// Validate that a key maps to a safe file name.
fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::invalid_key("Key cannot be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(StorageError::invalid_key(format!(
            "Key exceeds {MAX_KEY_LEN} bytes"
        )));
    }
    if key == "." || key == ".." {
        return Err(StorageError::invalid_key(format!("Invalid key: {key}")));
    }
    if key.contains('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::invalid_key(format!(
            "Key contains path separator or NUL: {key}"
        )));
    }
    Ok(())
}
