//! The value domain of the store.
//!
//! Values are JSON values; a snapshot is "a value or nothing", where
//! nothing (the undefined sentinel) means no usable value exists for the
//! key. The sentinel persists as the literal text `undefined`, which is
//! recognized before any decoder runs.

/// Decoded values stored in the cache.
pub type Value = serde_json::Value;

/// What a consumer observes for a key: a value, or no usable value.
pub type Snapshot = Option<Value>;

/// Raw text representing the undefined sentinel.
pub const UNDEFINED_LITERAL: &str = "undefined";

/// Cached state of one key.
///
/// A key that has never been read is simply absent from the cache; these
/// variants cover the two materialized states.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// Decoded successfully; `None` is the undefined sentinel.
    Loaded(Snapshot),
    /// The persisted raw text failed to decode.
    Corrupt,
}

impl CacheEntry {
    /// The snapshot consumers observe for this entry.
    ///
    /// Corrupt entries observe as JSON null, the known-bad marker that
    /// distinguishes "data was present but unusable" from the undefined
    /// sentinel.
    pub fn snapshot(&self) -> Snapshot {
        match self {
            Self::Loaded(snapshot) => snapshot.clone(),
            Self::Corrupt => Some(Value::Null),
        }
    }
}
