//! Instrumented storage backend for testing.
//!
//! Wraps an in-memory backend with per-operation failure injection and an
//! operation log, so tests can drive the store's error policy and count
//! how often it touches storage.

use mirrorkv_storage::{BackendId, MemoryBackend, StorageBackend, StorageError, StorageResult};
use std::sync::{Arc, Mutex};

/// A recorded backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    Read(String),
    Write(String),
    Remove(String),
    Contains(String),
}

#[derive(Default)]
struct FailurePlan {
    read: Option<String>,
    write: Option<String>,
    remove: Option<String>,
}

/// A storage backend that records every operation and can be told to fail.
///
/// Clones share state, so a test can hand one clone to a store and keep
/// the other for assertions. Injected failures surface as I/O errors and
/// leave the stored data untouched.
///
/// # Example
///
/// ```rust
/// use mirrorkv_storage::StorageBackend;
/// use mirrorkv_test_utils::ProbeBackend;
///
/// let backend = ProbeBackend::new().with_read_error("disk detached");
/// assert!(backend.read("any").is_err());
/// assert_eq!(backend.read_count(), 1);
/// ```
#[derive(Clone)]
pub struct ProbeBackend {
    inner: MemoryBackend,
    ops: Arc<Mutex<Vec<BackendOp>>>,
    fail: Arc<Mutex<FailurePlan>>,
}

impl ProbeBackend {
    /// Create a new probe backend with empty storage.
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            ops: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(Mutex::new(FailurePlan::default())),
        }
    }

    /// Seed a stored raw value.
    pub fn with_value(self, key: &str, raw: &str) -> Self {
        self.inner
            .write(key, raw)
            .unwrap_or_else(|err| panic!("seeding {key} failed: {err}"));
        self
    }

    /// Make every read (and containment probe) fail with this message.
    pub fn with_read_error(self, message: &str) -> Self {
        self.fail_reads(message);
        self
    }

    /// Make every write fail with this message.
    pub fn with_write_error(self, message: &str) -> Self {
        self.fail_writes(message);
        self
    }

    /// Make every removal fail with this message.
    pub fn with_remove_error(self, message: &str) -> Self {
        self.fail_removes(message);
        self
    }

    /// Start failing reads from now on; useful once a store is already open.
    pub fn fail_reads(&self, message: &str) {
        self.fail.lock().unwrap().read = Some(message.to_string());
    }

    /// Start failing writes from now on.
    pub fn fail_writes(&self, message: &str) {
        self.fail.lock().unwrap().write = Some(message.to_string());
    }

    /// Start failing removals from now on.
    pub fn fail_removes(&self, message: &str) {
        self.fail.lock().unwrap().remove = Some(message.to_string());
    }

    /// Stop injecting failures; stored data is kept.
    pub fn clear_failures(&self) {
        *self.fail.lock().unwrap() = FailurePlan::default();
    }

    /// All recorded operations, in order.
    pub fn ops(&self) -> Vec<BackendOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Total number of recorded operations.
    pub fn op_count(&self) -> usize {
        self.ops.lock().unwrap().len()
    }

    /// Number of reads recorded.
    pub fn read_count(&self) -> usize {
        self.count_matching(|op| matches!(op, BackendOp::Read(_)))
    }

    /// Number of writes recorded.
    pub fn write_count(&self) -> usize {
        self.count_matching(|op| matches!(op, BackendOp::Write(_)))
    }

    /// Number of removals recorded.
    pub fn remove_count(&self) -> usize {
        self.count_matching(|op| matches!(op, BackendOp::Remove(_)))
    }

    /// Forget recorded operations.
    pub fn clear_ops(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Stored raw value for `key`, without recording an operation.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.inner
            .read(key)
            .unwrap_or_else(|err| panic!("reading {key} failed: {err}"))
    }

    fn record(&self, op: BackendOp) {
        self.ops.lock().unwrap().push(op);
    }

    fn count_matching(&self, pred: impl Fn(&BackendOp) -> bool) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| pred(op)).count()
    }

    fn planned(&self, pick: impl Fn(&FailurePlan) -> Option<&String>) -> Option<StorageError> {
        pick(&self.fail.lock().unwrap())
            .map(|msg| StorageError::Io(std::io::Error::other(msg.clone())))
    }
}

impl Default for ProbeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for ProbeBackend {
    fn id(&self) -> BackendId {
        self.inner.id()
    }

    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        self.record(BackendOp::Read(key.to_string()));
        if let Some(err) = self.planned(|plan| plan.read.as_ref()) {
            return Err(err);
        }
        self.inner.read(key)
    }

    fn write(&self, key: &str, raw: &str) -> StorageResult<()> {
        self.record(BackendOp::Write(key.to_string()));
        if let Some(err) = self.planned(|plan| plan.write.as_ref()) {
            return Err(err);
        }
        self.inner.write(key, raw)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.record(BackendOp::Remove(key.to_string()));
        if let Some(err) = self.planned(|plan| plan.remove.as_ref()) {
            return Err(err);
        }
        self.inner.remove(key)
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        self.record(BackendOp::Contains(key.to_string()));
        // Containment is a read as far as failure policy goes
        if let Some(err) = self.planned(|plan| plan.read.as_ref()) {
            return Err(err);
        }
        self.inner.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_records_operations_in_order() {
        let backend = ProbeBackend::new();
        backend.write("a", "1").unwrap();
        let _ = backend.read("a").unwrap();
        backend.remove("a").unwrap();

        assert_eq!(
            backend.ops(),
            vec![
                BackendOp::Write("a".to_string()),
                BackendOp::Read("a".to_string()),
                BackendOp::Remove("a".to_string()),
            ]
        );
        assert_eq!(backend.op_count(), 3);
    }

    #[test]
    fn test_probe_clones_share_state() {
        let backend = ProbeBackend::new();
        let probe = backend.clone();
        backend.write("a", "1").unwrap();

        assert_eq!(probe.raw("a").as_deref(), Some("1"));
        assert_eq!(probe.write_count(), 1);
    }

    #[test]
    fn test_injected_read_failure_leaves_data_alone() {
        let backend = ProbeBackend::new()
            .with_value("a", "1")
            .with_read_error("no disk");

        assert!(backend.read("a").is_err());
        assert!(backend.contains("a").is_err());
        assert_eq!(backend.raw("a").as_deref(), Some("1"));

        backend.clear_failures();
        assert_eq!(backend.read("a").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_injected_write_failure_does_not_persist() {
        let backend = ProbeBackend::new().with_write_error("read-only");

        assert!(backend.write("a", "1").is_err());
        assert_eq!(backend.raw("a"), None);
        assert_eq!(backend.write_count(), 1);
    }

    #[test]
    fn test_injected_remove_failure_keeps_value() {
        let backend = ProbeBackend::new()
            .with_value("a", "1")
            .with_remove_error("busy");

        assert!(backend.remove("a").is_err());
        assert_eq!(backend.raw("a").as_deref(), Some("1"));
    }

    #[test]
    fn test_clear_ops_resets_counters() {
        let backend = ProbeBackend::new();
        backend.write("a", "1").unwrap();
        backend.clear_ops();

        assert_eq!(backend.op_count(), 0);
        assert_eq!(backend.raw("a").as_deref(), Some("1"));
    }
}
