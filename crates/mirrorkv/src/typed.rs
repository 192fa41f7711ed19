//! Typed convenience surface over a store.
//!
//! Serde conversion happens at this edge: the engine below stays in the
//! JSON value domain. Values that no longer convert to `T` follow decode
//! policy (logged, replaced by the supplied default, never returned as
//! errors); values of `T` that cannot be serialized follow encode policy
//! (logged, returned unless the store is silent).

use crate::context::{ChangeListener, StoreContext};
use crate::contract::{open_store, SnapshotStore, Subscription};
use crate::engine::SetAction;
use crate::error::{StoreError, StoreResult};
use crate::options::{LogSink, Options};
use crate::value::Snapshot;
use mirrorkv_storage::StorageBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// A store viewed through a serde-serializable type.
///
/// The supplied default stands in whenever the snapshot is the undefined
/// sentinel, which also makes a backend-less substitute yield it.
pub struct TypedStore<T> {
    store: Arc<dyn SnapshotStore>,
    default: Option<T>,
    log: LogSink,
    silent: bool,
}

impl<T> TypedStore<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Open a typed store for `key`.
    ///
    /// The engine is seeded with `default` (serialized once here); without
    /// a backend the no-op substitute is used and `default` only ever
    /// surfaces through [`TypedStore::get`].
    pub fn open(
        backend: Option<Arc<dyn StorageBackend>>,
        ctx: StoreContext,
        key: impl Into<String>,
        default: Option<T>,
        options: Options,
    ) -> StoreResult<Self> {
        let key = key.into();
        let log = options.log.clone();
        let silent = options.silent;
        let seed = match &default {
            Some(value) => match serde_json::to_value(value) {
                Ok(json) => Some(json),
                Err(err) => {
                    let err = StoreError::encode(&key, err.into());
                    log.report(&err);
                    return Err(err);
                }
            },
            None => None,
        };
        let store = open_store(backend, ctx, key, seed, options)?;
        Ok(Self {
            store,
            default,
            log,
            silent,
        })
    }

    /// Wrap an already-open store.
    ///
    /// Conversion failures are reported to the default sink and never
    /// raised; [`TypedStore::open`] carries the options' own policy.
    pub fn new(store: Arc<dyn SnapshotStore>, default: Option<T>) -> Self {
        Self {
            store,
            default,
            log: LogSink::default(),
            silent: true,
        }
    }

    /// Replace the sink conversion failures are reported to.
    pub fn with_log_sink(mut self, log: LogSink) -> Self {
        self.log = log;
        self
    }

    /// The underlying untyped store.
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Current value, falling back to the supplied default when the
    /// snapshot is undefined or no longer converts to `T`.
    pub fn get(&self) -> StoreResult<Option<T>> {
        let snapshot = self.store.snapshot()?;
        Ok(self.convert(snapshot).or_else(|| self.default.clone()))
    }

    /// Store a value.
    ///
    /// A value that does not serialize is reported; when the store is not
    /// silent it is also returned as an error.
    pub fn set(&self, value: &T) -> StoreResult<()> {
        match serde_json::to_value(value) {
            Ok(json) => self.store.set_item(SetAction::Value(Some(json))),
            Err(err) => self.fail(StoreError::encode(self.store.key(), err.into())),
        }
    }

    /// Derive the next value from the current one.
    ///
    /// The function sees the current value (or the default when there is
    /// none). Serialization happens before the write: a next value that
    /// does not serialize leaves the store and its listeners untouched and
    /// follows the encode policy of [`TypedStore::set`].
    pub fn update(&self, update: impl FnOnce(Option<T>) -> T) -> StoreResult<()> {
        let snapshot = self.store.snapshot()?;
        let current = self.convert(snapshot).or_else(|| self.default.clone());
        match serde_json::to_value(update(current)) {
            Ok(json) => self.store.set_item(SetAction::Value(Some(json))),
            Err(err) => self.fail(StoreError::encode(self.store.key(), err.into())),
        }
    }

    /// Register a change listener.
    pub fn subscribe(&self, listener: ChangeListener) -> Subscription {
        self.store.subscribe(listener)
    }

    /// Report a conversion failure and decide whether the caller sees it.
    fn fail(&self, err: StoreError) -> StoreResult<()> {
        self.log.report(&err);
        if !self.silent && err.propagates() {
            return Err(err);
        }
        Ok(())
    }

    fn convert(&self, snapshot: Snapshot) -> Option<T> {
        let value = snapshot?;
        match serde_json::from_value(value) {
            Ok(converted) => Some(converted),
            Err(err) => {
                self.log
                    .report(&StoreError::decode(self.store.key(), err.into()));
                None
            }
        }
    }
}
