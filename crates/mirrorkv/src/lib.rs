//! Synchronized key-value store engine for mirrorkv.
//!
//! This crate provides the caller-facing surface of mirrorkv:
//! - Pluggable codec (JSON by default) with an undefined sentinel
//! - Process-wide snapshot cache shared by every store on a key
//! - Change listeners and absorption of changes made by other handles
//! - Store engine (init, snapshot, set) with a silent/loud error policy
//! - Typed wrapper for serde-serializable values
//! - No-op substitute for environments without a storage backend

pub mod codec;
pub mod context;
pub mod contract;
pub mod engine;
pub mod error;
pub mod log;
pub mod options;
pub mod typed;
pub mod value;

pub use codec::{Codec, DecodeFn, EncodeFn};
pub use context::{ChangeListener, ListenerId, StoreContext};
pub use contract::{open_store, NoopStore, SnapshotStore, Subscription};
pub use engine::{SetAction, StoreEngine, UpdateFn};
pub use error::{CodecFailure, StoreError, StoreResult};
pub use options::{InitValidator, LogSink, Options};
pub use typed::TypedStore;
pub use value::{CacheEntry, Snapshot, Value, UNDEFINED_LITERAL};
// Re-export the storage essentials so embedders rarely need the storage
// crate as a direct dependency
pub use mirrorkv_storage::{
    BackendId, BackendWatcher, ChangeEvent, ChangeHub, FileBackend, MemoryBackend, StorageBackend,
    StorageError,
};
