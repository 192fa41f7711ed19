//! Shared state of one execution context.
//!
//! All engines in a context share one [`StoreContext`]: the decoded cache,
//! the listener registry, the validated-key set, and the change hub. Two
//! engines constructed for the same key in the same context therefore
//! observe the same state and each other's notifications.

use crate::value::CacheEntry;
use mirrorkv_storage::{ChangeHandler, ChangeHub, HandlerId};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Callback notified when a key's snapshot changes.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static GLOBAL: Lazy<StoreContext> = Lazy::new(StoreContext::new);

/// Handle to the shared state of one execution context.
///
/// Cloning is cheap and clones observe the same state. Most applications
/// use [`StoreContext::global`]; tests construct fresh contexts (or call
/// [`StoreContext::reset`]) to isolate cases.
#[derive(Clone)]
pub struct StoreContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    cache: RwLock<HashMap<String, CacheEntry>>,
    listeners: RwLock<HashMap<String, HashMap<ListenerId, ChangeListener>>>,
    validated: RwLock<HashSet<String>>,
    hooks: RwLock<HashMap<String, ExternalHook>>,
    hub: ChangeHub,
    next_listener: AtomicU64,
}

/// One hub handler shared by every subscriber of a key.
struct ExternalHook {
    handler: HandlerId,
    subscribers: usize,
}

impl StoreContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                cache: RwLock::new(HashMap::new()),
                listeners: RwLock::new(HashMap::new()),
                validated: RwLock::new(HashSet::new()),
                hooks: RwLock::new(HashMap::new()),
                hub: ChangeHub::new(),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// The process-wide context.
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// The change hub external events for this context are dispatched to.
    pub fn hub(&self) -> &ChangeHub {
        &self.inner.hub
    }

    /// Clear cache, listeners, validated marks, and external hooks.
    ///
    /// Meant for tests sharing a context across cases. Hook handlers are
    /// detached from the hub as well.
    pub fn reset(&self) {
        write_lock(&self.inner.cache).clear();
        write_lock(&self.inner.listeners).clear();
        write_lock(&self.inner.validated).clear();
        let hooks: Vec<ExternalHook> = write_lock(&self.inner.hooks)
            .drain()
            .map(|(_, hook)| hook)
            .collect();
        for hook in hooks {
            self.inner.hub.detach(hook.handler);
        }
    }

    /// Number of listeners currently registered for `key`.
    pub fn listener_count(&self, key: &str) -> usize {
        read_lock(&self.inner.listeners)
            .get(key)
            .map_or(0, HashMap::len)
    }

    pub(crate) fn entry(&self, key: &str) -> Option<CacheEntry> {
        read_lock(&self.inner.cache).get(key).cloned()
    }

    pub(crate) fn store_entry(&self, key: &str, entry: CacheEntry) {
        write_lock(&self.inner.cache).insert(key.to_string(), entry);
    }

    pub(crate) fn is_validated(&self, key: &str) -> bool {
        read_lock(&self.inner.validated).contains(key)
    }

    pub(crate) fn mark_validated(&self, key: &str) {
        write_lock(&self.inner.validated).insert(key.to_string());
    }

    pub(crate) fn add_listener(&self, key: &str, listener: ChangeListener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        write_lock(&self.inner.listeners)
            .entry(key.to_string())
            .or_default()
            .insert(id, listener);
        id
    }

    pub(crate) fn remove_listener(&self, key: &str, id: ListenerId) {
        let mut listeners = write_lock(&self.inner.listeners);
        if let Some(set) = listeners.get_mut(key) {
            set.remove(&id);
            if set.is_empty() {
                listeners.remove(key);
            }
        }
    }

    /// Invoke every listener registered for `key`.
    ///
    /// The set is snapshotted first and callbacks run without any lock
    /// held, so listeners may subscribe, unsubscribe, or write. There is no
    /// ordering guarantee among listeners.
    pub(crate) fn notify(&self, key: &str) {
        let listeners: Vec<ChangeListener> = {
            let guard = read_lock(&self.inner.listeners);
            match guard.get(key) {
                Some(set) => set.values().cloned().collect(),
                None => return,
            }
        };
        for listener in listeners {
            listener();
        }
    }

    /// Install (or share) the per-key hub handler backing cross-context
    /// sync. The first subscriber attaches it; later subscribers reuse it.
    pub(crate) fn arm_external(&self, key: &str, make_handler: impl FnOnce() -> ChangeHandler) {
        let mut hooks = write_lock(&self.inner.hooks);
        if let Some(hook) = hooks.get_mut(key) {
            hook.subscribers += 1;
            return;
        }
        let handler = self.inner.hub.attach(make_handler());
        hooks.insert(
            key.to_string(),
            ExternalHook {
                handler,
                subscribers: 1,
            },
        );
    }

    /// Release one share of the per-key hub handler, detaching it when the
    /// last subscriber is gone.
    pub(crate) fn disarm_external(&self, key: &str) {
        let mut hooks = write_lock(&self.inner.hooks);
        let Some(hook) = hooks.get_mut(key) else {
            return;
        };
        hook.subscribers -= 1;
        if hook.subscribers == 0 {
            let handler = hook.handler;
            hooks.remove(key);
            self.inner.hub.detach(handler);
        }
    }
}

impl Default for StoreContext {
    fn default() -> Self {
        Self::new()
    }
}

// Listener callbacks run outside every lock, so a poisoned map means a
// panic inside a plain map operation; recovering the data keeps the other
// consumers of the context alive.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
