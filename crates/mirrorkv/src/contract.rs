//! The snapshot/subscribe contract and the no-backend substitute.
//!
//! Reactive bindings consume exactly three operations: subscribe, snapshot,
//! and set_item. Environments without a usable backend get a stateless
//! no-op implementation, selected once at construction and never branched
//! on again.

use crate::context::{ChangeListener, ListenerId, StoreContext};
use crate::engine::{SetAction, StoreEngine};
use crate::error::StoreResult;
use crate::options::Options;
use crate::value::Snapshot;
use mirrorkv_storage::StorageBackend;
use std::sync::Arc;
use tracing::debug;

/// The surface consumed by reactive bindings.
pub trait SnapshotStore: Send + Sync {
    /// Key this store serves.
    fn key(&self) -> &str;

    /// Register a change listener for the store's key.
    fn subscribe(&self, listener: ChangeListener) -> Subscription;

    /// The current snapshot.
    fn snapshot(&self) -> StoreResult<Snapshot>;

    /// Apply a write.
    fn set_item(&self, action: SetAction) -> StoreResult<()>;
}

/// Listener registration guard.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) removes the
/// listener from the registry and releases the cross-context hook it
/// shares.
#[must_use = "dropping the subscription immediately unsubscribes"]
pub struct Subscription {
    inner: Option<ActiveSubscription>,
}

struct ActiveSubscription {
    ctx: StoreContext,
    key: String,
    listener: ListenerId,
    synced: bool,
}

impl Subscription {
    pub(crate) fn active(
        ctx: StoreContext,
        key: String,
        listener: ListenerId,
        synced: bool,
    ) -> Self {
        Self {
            inner: Some(ActiveSubscription {
                ctx,
                key,
                listener,
                synced,
            }),
        }
    }

    /// An inert guard, as handed out by [`NoopStore`].
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Release the registration now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(sub) = self.inner.take() {
            sub.ctx.remove_listener(&sub.key, sub.listener);
            if sub.synced {
                sub.ctx.disarm_external(&sub.key);
            }
        }
    }
}

/// Store substitute for environments without a backend.
///
/// Subscribe hands out an inert guard, reads always yield the undefined
/// sentinel, and writes succeed without effect. Callers' supplied defaults
/// take over at the typed layer.
pub struct NoopStore {
    key: String,
}

impl NoopStore {
    /// Create a substitute for `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl SnapshotStore for NoopStore {
    fn key(&self) -> &str {
        &self.key
    }

    fn subscribe(&self, _listener: ChangeListener) -> Subscription {
        Subscription::noop()
    }

    fn snapshot(&self) -> StoreResult<Snapshot> {
        Ok(None)
    }

    fn set_item(&self, _action: SetAction) -> StoreResult<()> {
        Ok(())
    }
}

/// Open a store for `key`: an engine when a backend is available, the
/// no-op substitute otherwise.
pub fn open_store(
    backend: Option<Arc<dyn StorageBackend>>,
    ctx: StoreContext,
    key: impl Into<String>,
    default: Snapshot,
    options: Options,
) -> StoreResult<Arc<dyn SnapshotStore>> {
    let key = key.into();
    match backend {
        Some(backend) => {
            let engine = StoreEngine::init(ctx, backend, key, default, options)?;
            Ok(Arc::new(engine))
        }
        None => {
            debug!(key = %key, "No storage backend available; using the no-op store");
            Ok(Arc::new(NoopStore::new(key)))
        }
    }
}
