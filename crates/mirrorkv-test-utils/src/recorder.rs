//! Recording error sinks and change listeners.
//!
//! The store reports swallowed failures through its log sink and change
//! notifications through listeners; these helpers capture both so tests
//! can assert on exactly what was reported.

use mirrorkv::{ChangeListener, LogSink, StoreError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The kind of a reported store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Read,
    Write,
    Encode,
    Decode,
}

/// A reported store error, flattened for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub key: String,
    pub message: String,
}

impl From<&StoreError> for ErrorRecord {
    fn from(err: &StoreError) -> Self {
        let kind = match err {
            StoreError::Read { .. } => ErrorKind::Read,
            StoreError::Write { .. } => ErrorKind::Write,
            StoreError::Encode { .. } => ErrorKind::Encode,
            StoreError::Decode { .. } => ErrorKind::Decode,
        };
        Self {
            kind,
            key: err.key().to_string(),
            message: err.to_string(),
        }
    }
}

/// Captures every error reported through a store's log sink.
///
/// # Example
///
/// ```rust
/// use mirrorkv::Options;
/// use mirrorkv_test_utils::{ErrorKind, RecordingSink};
///
/// let recorder = RecordingSink::new();
/// let options = Options::default().with_log_sink(recorder.sink());
/// // ...run store operations with `options`...
/// assert!(recorder.kinds().iter().all(|kind| *kind != ErrorKind::Read));
/// ```
#[derive(Clone, Default)]
pub struct RecordingSink {
    seen: Arc<Mutex<Vec<ErrorRecord>>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A log sink that records into this recorder.
    pub fn sink(&self) -> LogSink {
        let seen = Arc::clone(&self.seen);
        LogSink::new(move |err| seen.lock().unwrap().push(ErrorRecord::from(err)))
    }

    /// All recorded errors, in report order.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.seen.lock().unwrap().clone()
    }

    /// Just the kinds, in report order.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.seen.lock().unwrap().iter().map(|r| r.kind).collect()
    }

    /// Number of errors recorded.
    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// True when nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Forget recorded errors.
    pub fn clear(&self) {
        self.seen.lock().unwrap().clear();
    }
}

/// Counts how often a store notified its subscribers.
#[derive(Clone, Default)]
pub struct CountingListener {
    hits: Arc<AtomicUsize>,
}

impl CountingListener {
    /// Create a listener with a zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// The listener to subscribe with; clones count into the same total.
    pub fn listener(&self) -> ChangeListener {
        let hits = Arc::clone(&self.hits);
        Arc::new(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Number of notifications observed.
    pub fn count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Reset the count to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::SeqCst);
    }
}
