//! Testing utilities and mocks for mirrorkv.
//!
//! This crate provides common testing infrastructure used across the mirrorkv workspace:
//!
//! - **Probe**: An instrumented storage backend with failure injection
//! - **Recorder**: Capturing log sinks and counting change listeners
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use mirrorkv_test_utils::{CountingListener, ProbeBackend, RecordingSink};
//!
//! let backend = ProbeBackend::new().with_write_error("device full");
//! let recorder = RecordingSink::new();
//! let counter = CountingListener::new();
//!
//! // Hand `backend` and `recorder.sink()` to a store, subscribe with
//! // `counter.listener()`, then assert on what was recorded.
//! ```

pub mod probe;
pub mod recorder;

// Re-export commonly used items
pub use probe::{BackendOp, ProbeBackend};
pub use recorder::{CountingListener, ErrorKind, ErrorRecord, RecordingSink};
