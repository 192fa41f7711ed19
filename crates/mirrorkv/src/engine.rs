//! The store engine: initialize, read, write, subscribe.
//!
//! One engine is one consumer's view of one key. Engines sharing a
//! [`StoreContext`] share the decoded cache and notify each other; the
//! backend is only consulted on cache misses and writes.

use crate::context::{ChangeListener, StoreContext};
use crate::contract::{SnapshotStore, Subscription};
use crate::error::{StoreError, StoreResult};
use crate::options::Options;
use crate::value::{CacheEntry, Snapshot, Value};
use mirrorkv_storage::{BackendId, ChangeEvent, ChangeHandler, StorageBackend};
use std::sync::Arc;
use tracing::debug;

/// A write request: a snapshot to store, or a function of the current one.
pub enum SetAction {
    /// Store this snapshot.
    Value(Snapshot),
    /// Derive the new snapshot from the current one.
    Update(UpdateFn),
}

/// Function form of a write.
pub type UpdateFn = Box<dyn FnOnce(Snapshot) -> Snapshot + Send>;

impl SetAction {
    /// Build the function form.
    pub fn update(update: impl FnOnce(Snapshot) -> Snapshot + Send + 'static) -> Self {
        Self::Update(Box::new(update))
    }
}

impl From<Snapshot> for SetAction {
    fn from(snapshot: Snapshot) -> Self {
        Self::Value(snapshot)
    }
}

impl From<Value> for SetAction {
    fn from(value: Value) -> Self {
        Self::Value(Some(value))
    }
}

/// Engine for one key against one backend, within one context.
#[derive(Clone)]
pub struct StoreEngine {
    key: String,
    backend: Arc<dyn StorageBackend>,
    backend_id: BackendId,
    ctx: StoreContext,
    options: Options,
}

impl StoreEngine {
    /// Create an engine for `key`.
    ///
    /// If the backend holds no value for the key, `default` is persisted
    /// and cached. If it does and an init validator is configured, the
    /// persisted value is validated once per key per context: an invalid
    /// value is replaced by a concrete default or removed when the default
    /// is the undefined sentinel.
    ///
    /// Returns an error only under `silent: false` when the backend or the
    /// encoder fails.
    pub fn init(
        ctx: StoreContext,
        backend: Arc<dyn StorageBackend>,
        key: impl Into<String>,
        default: Snapshot,
        options: Options,
    ) -> StoreResult<Self> {
        let backend_id = backend.id();
        let engine = Self {
            key: key.into(),
            backend,
            backend_id,
            ctx,
            options,
        };

        if !engine.backend_has_value()? {
            engine.set_item(SetAction::Value(default))?;
            return Ok(engine);
        }

        if engine.options.validate_init.is_some() && !engine.ctx.is_validated(&engine.key) {
            engine.validate_existing(default)?;
        }

        Ok(engine)
    }

    /// Key this engine serves.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Context this engine shares state through.
    pub fn context(&self) -> &StoreContext {
        &self.ctx
    }

    /// The current snapshot.
    ///
    /// Fills the cache from the backend on first use; afterwards the
    /// backend is not consulted until an external change or a write
    /// replaces the entry. Never notifies.
    pub fn snapshot(&self) -> StoreResult<Snapshot> {
        if let Some(entry) = self.ctx.entry(&self.key) {
            return Ok(entry.snapshot());
        }
        let entry = self.load_fresh()?;
        self.ctx.store_entry(&self.key, entry.clone());
        Ok(entry.snapshot())
    }

    /// Apply a write: persist, update the cache, notify listeners.
    ///
    /// Under `silent: true` a backend or encode failure is logged and the
    /// cache is still updated, keeping consumers consistent with each other
    /// even when persistence is lost. Under `silent: false` the failure is
    /// returned and the cache is left untouched.
    pub fn set_item(&self, action: impl Into<SetAction>) -> StoreResult<()> {
        let snapshot = match action.into() {
            SetAction::Value(snapshot) => snapshot,
            SetAction::Update(update) => update(self.snapshot()?),
        };
        self.persist_snapshot(&snapshot)?;
        self.ctx.store_entry(&self.key, CacheEntry::Loaded(snapshot));
        self.ctx.notify(&self.key);
        Ok(())
    }

    /// Register a change listener for this key.
    ///
    /// With `sync` enabled the first subscriber also installs the shared
    /// per-key hook that absorbs cross-context change events; the returned
    /// guard releases both on drop.
    pub fn subscribe(&self, listener: ChangeListener) -> Subscription {
        let id = self.ctx.add_listener(&self.key, listener);
        let synced = self.options.sync;
        if synced {
            self.ctx.arm_external(&self.key, || self.change_handler());
        }
        Subscription::active(self.ctx.clone(), self.key.clone(), id, synced)
    }

    /// Log a failure and decide whether the caller sees it.
    fn fail(&self, err: StoreError) -> StoreResult<()> {
        self.options.log.report(&err);
        if !self.options.silent && err.propagates() {
            return Err(err);
        }
        Ok(())
    }

    /// Whether the backend currently holds any value for the key. An
    /// unreadable backend counts as absent under `silent: true`.
    fn backend_has_value(&self) -> StoreResult<bool> {
        match self.backend.contains(&self.key) {
            Ok(present) => Ok(present),
            Err(err) => {
                self.fail(StoreError::read(&self.key, err))?;
                Ok(false)
            }
        }
    }

    /// Read and decode the persisted value without touching the cache.
    ///
    /// Undecodable raw text is logged, removed from the backend
    /// (best-effort), and reported as the known-bad entry.
    fn load_fresh(&self) -> StoreResult<CacheEntry> {
        let raw = match self.backend.read(&self.key) {
            Ok(raw) => raw,
            Err(err) => {
                self.fail(StoreError::read(&self.key, err))?;
                None
            }
        };
        match self.options.codec.decode_raw(raw.as_deref()) {
            Ok(snapshot) => Ok(CacheEntry::Loaded(snapshot)),
            Err(err) => {
                self.fail(StoreError::decode(&self.key, err))?;
                if let Err(remove_err) = self.backend.remove(&self.key) {
                    // Cleanup is best-effort; the entry still reads as
                    // known-bad either way.
                    self.options
                        .log
                        .report(&StoreError::write(&self.key, remove_err));
                }
                Ok(CacheEntry::Corrupt)
            }
        }
    }

    /// Encode and write a snapshot, applying the error policy. The cache
    /// is deliberately not touched here.
    fn persist_snapshot(&self, snapshot: &Snapshot) -> StoreResult<()> {
        match self.options.codec.encode_snapshot(snapshot) {
            Ok(raw) => {
                if let Err(err) = self.backend.write(&self.key, &raw) {
                    self.fail(StoreError::write(&self.key, err))?;
                }
            }
            Err(err) => self.fail(StoreError::encode(&self.key, err))?,
        }
        Ok(())
    }

    /// Validate an already-persisted value, once per key per context.
    fn validate_existing(&self, default: Snapshot) -> StoreResult<()> {
        let Some(validator) = self.options.validate_init.clone() else {
            return Ok(());
        };

        let current = self.load_fresh()?.snapshot();
        if !validator(&current) {
            match default {
                Some(_) => {
                    // Replace the invalid value. The cache stays cold, so
                    // the next read decodes the replacement.
                    self.persist_snapshot(&default)?;
                }
                None => {
                    if let Err(err) = self.backend.remove(&self.key) {
                        self.fail(StoreError::write(&self.key, err))?;
                    }
                }
            }
        }
        self.ctx.mark_validated(&self.key);
        Ok(())
    }

    /// Handler absorbing cross-context changes for this key.
    fn change_handler(&self) -> ChangeHandler {
        let key = self.key.clone();
        let ctx = self.ctx.clone();
        let codec = self.options.codec.clone();
        let log = self.options.log.clone();
        let own_id = self.backend_id;
        Arc::new(move |event: &ChangeEvent| {
            if event.key != key {
                return;
            }
            if event.origin == Some(own_id) {
                return;
            }
            // The event's raw text is decoded directly into the cache.
            // External corruption is marked known-bad without cleaning up
            // the backend, unlike the plain read path.
            let entry = match codec.decode_raw(event.new_raw.as_deref()) {
                Ok(snapshot) => CacheEntry::Loaded(snapshot),
                Err(err) => {
                    log.report(&StoreError::decode(&key, err));
                    CacheEntry::Corrupt
                }
            };
            debug!(key = %key, "Absorbing external change");
            ctx.store_entry(&key, entry);
            ctx.notify(&key);
        })
    }
}

impl SnapshotStore for StoreEngine {
    fn key(&self) -> &str {
        StoreEngine::key(self)
    }

    fn subscribe(&self, listener: ChangeListener) -> Subscription {
        StoreEngine::subscribe(self, listener)
    }

    fn snapshot(&self) -> StoreResult<Snapshot> {
        StoreEngine::snapshot(self)
    }

    fn set_item(&self, action: SetAction) -> StoreResult<()> {
        StoreEngine::set_item(self, action)
    }
}
