//! Change notification for a storage domain.
//!
//! A [`ChangeHub`] fans observed storage changes out to attached handlers
//! within one execution context. Events come from the filesystem watcher in
//! production ([`crate::BackendWatcher`]) or are dispatched directly in
//! tests to simulate another context's writes.

use crate::BackendId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// A change observed in the shared storage domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Key that changed.
    pub key: String,
    /// Raw text after the change; `None` when the key was removed.
    pub new_raw: Option<String>,
    /// Identity of the backend handle that authored the change, when known.
    pub origin: Option<BackendId>,
}

impl ChangeEvent {
    /// Event for a key that now holds `raw`.
    pub fn upsert(key: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            new_raw: Some(raw.into()),
            origin: None,
        }
    }

    /// Event for a removed key.
    pub fn removal(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            new_raw: None,
            origin: None,
        }
    }

    /// Attach the authoring backend's identity.
    pub fn with_origin(mut self, origin: BackendId) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Handler invoked for every dispatched change.
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Identity of an attached handler, used to detach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Fan-out point for change events within one execution context.
///
/// Dispatch is synchronous: every attached handler runs before `dispatch`
/// returns. The handler list is snapshotted before invocation, so handlers
/// may attach or detach (including themselves) while a dispatch is in
/// flight; a handler detached mid-dispatch may still observe that event.
#[derive(Clone)]
pub struct ChangeHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    handlers: RwLock<HashMap<HandlerId, ChangeHandler>>,
    next_id: AtomicU64,
}

impl ChangeHub {
    /// Create a new hub with no handlers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                handlers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Attach a handler, returning the id needed to detach it.
    pub fn attach(&self, handler: ChangeHandler) -> HandlerId {
        let id = HandlerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handler);
        id
    }

    /// Detach a handler. Detaching an unknown id is a no-op.
    pub fn detach(&self, id: HandlerId) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Deliver an event to every attached handler.
    pub fn dispatch(&self, event: &ChangeEvent) {
        let handlers: Vec<ChangeHandler> = {
            let guard = self
                .inner
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            guard.values().cloned().collect()
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Number of currently attached handlers.
    pub fn handler_count(&self) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}
