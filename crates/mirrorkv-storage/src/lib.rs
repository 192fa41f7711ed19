//! Persistent backend layer for mirrorkv.
//!
//! This crate provides the raw-text key-value backends the store engine
//! mirrors, plus the change-notification plumbing between execution
//! contexts:
//! - File backend (one file per key, atomic writes)
//! - In-memory backend (for tests and ephemeral domains)
//! - Change hub and filesystem watcher (cross-context notification)

pub mod backend;
pub mod error;
pub mod events;
pub mod file;
pub mod memory;
pub mod watch;

pub use backend::{BackendId, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use events::{ChangeEvent, ChangeHandler, ChangeHub, HandlerId};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use watch::BackendWatcher;
