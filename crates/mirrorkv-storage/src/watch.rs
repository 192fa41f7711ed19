//! Filesystem watcher bridging backend changes into a [`ChangeHub`].
//!
//! Other processes sharing a [`FileBackend`] directory announce their writes
//! through the filesystem itself. The watcher observes those changes and
//! dispatches [`ChangeEvent`]s; changes matching the backend's own shadow
//! map are marked with the backend's identity so engines can suppress the
//! echo of their own writes.

use crate::{ChangeEvent, ChangeHub, FileBackend, StorageBackend, StorageResult};
use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Watches a file backend's directory and feeds changes into a hub.
///
/// The watcher runs on its own thread (owned by `notify`) for as long as
/// this value is alive; dropping it stops observation. One watcher per
/// backend handle per process is the intended setup.
pub struct BackendWatcher {
    _watcher: Box<dyn Watcher + Send>,
}

impl BackendWatcher {
    /// Spawn a watcher using the platform's native facility.
    pub fn spawn(backend: &FileBackend, hub: ChangeHub) -> StorageResult<Self> {
        let handler = make_handler(backend.clone(), hub);
        let mut watcher = RecommendedWatcher::new(handler, Config::default())?;
        watcher.watch(backend.base_path(), RecursiveMode::NonRecursive)?;
        debug!(path = %backend.base_path().display(), "Watching storage directory");
        Ok(Self {
            _watcher: Box::new(watcher),
        })
    }

    /// Spawn a polling watcher.
    ///
    /// Works on filesystems without native change notification and gives
    /// tests a deterministic upper bound on delivery latency.
    pub fn spawn_polling(
        backend: &FileBackend,
        hub: ChangeHub,
        interval: Duration,
    ) -> StorageResult<Self> {
        let handler = make_handler(backend.clone(), hub);
        let config = Config::default().with_poll_interval(interval);
        let mut watcher = PollWatcher::new(handler, config)?;
        watcher.watch(backend.base_path(), RecursiveMode::NonRecursive)?;
        debug!(path = %backend.base_path().display(), "Polling storage directory");
        Ok(Self {
            _watcher: Box::new(watcher),
        })
    }
}

fn make_handler(
    backend: FileBackend,
    hub: ChangeHub,
) -> impl FnMut(Result<Event, notify::Error>) + Send + 'static {
    move |result| match result {
        Ok(event) => {
            // Reads generate access events on some platforms; only
            // mutations are of interest.
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            for path in &event.paths {
                if let Some(change) = probe_change(&backend, path) {
                    hub.dispatch(&change);
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "Storage watcher error");
        }
    }
}

/// Inspect the current state of a possibly-changed path and build the
/// corresponding event, if the path belongs to the backend's key space.
///
/// The event reflects the state at probe time rather than the state the
/// triggering notification described; stale intermediate contents collapse
/// into the latest state.
fn probe_change(backend: &FileBackend, path: &Path) -> Option<ChangeEvent> {
    let key = FileBackend::path_to_key(path)?;

    let (new_raw, own) = match backend.observe(key) {
        Ok(observed) => observed,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not probe changed file");
            return None;
        }
    };

    let mut event = match new_raw {
        Some(raw) => ChangeEvent::upsert(key, raw),
        None => ChangeEvent::removal(key),
    };
    if own {
        event = event.with_origin(backend.id());
    }
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn probe_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        std::fs::write(dir.path().join("scratch.txt"), "x").unwrap();
        std::fs::write(dir.path().join("half.kv.tmp"), "x").unwrap();

        assert!(probe_change(&backend, &dir.path().join("scratch.txt")).is_none());
        assert!(probe_change(&backend, &dir.path().join("half.kv.tmp")).is_none());
    }

    #[test]
    fn probe_reports_external_upsert_without_origin() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let other = FileBackend::open(dir.path()).unwrap();

        other.write("shared", "99").unwrap();

        let event = probe_change(&backend, &dir.path().join("shared.kv")).unwrap();
        assert_eq!(event.key, "shared");
        assert_eq!(event.new_raw.as_deref(), Some("99"));
        assert_eq!(event.origin, None);
    }

    #[test]
    fn probe_marks_own_write_as_echo() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();

        backend.write("mine", "1").unwrap();

        let event = probe_change(&backend, &dir.path().join("mine.kv")).unwrap();
        assert_eq!(event.origin, Some(backend.id()));
    }

    #[test]
    fn probe_reports_removal_for_missing_file() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let other = FileBackend::open(dir.path()).unwrap();

        other.write("gone", "1").unwrap();
        other.remove("gone").unwrap();

        let event = probe_change(&backend, &dir.path().join("gone.kv")).unwrap();
        assert_eq!(event.new_raw, None);
        assert_eq!(event.origin, None);
    }

    #[test]
    fn polling_watcher_delivers_external_writes() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let hub = ChangeHub::new();

        let (tx, rx) = mpsc::channel::<ChangeEvent>();
        hub.attach(Arc::new(move |event: &ChangeEvent| {
            let _ = tx.send(event.clone());
        }));

        let _watcher =
            BackendWatcher::spawn_polling(&backend, hub, Duration::from_millis(50)).unwrap();

        // A separate handle onto the same directory, as another process
        // would have.
        let writer = FileBackend::open(dir.path()).unwrap();
        writer.write("observed", "\"from outside\"").unwrap();

        let event = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("watcher should report the external write");
        assert_eq!(event.key, "observed");
        assert_eq!(event.new_raw.as_deref(), Some("\"from outside\""));
        assert_eq!(event.origin, None);
    }

    #[test]
    fn polling_watcher_marks_own_writes() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let hub = ChangeHub::new();

        let (tx, rx) = mpsc::channel::<ChangeEvent>();
        hub.attach(Arc::new(move |event: &ChangeEvent| {
            let _ = tx.send(event.clone());
        }));

        let _watcher =
            BackendWatcher::spawn_polling(&backend, hub, Duration::from_millis(50)).unwrap();

        backend.write("own", "1").unwrap();

        let event = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("watcher should report the write");
        assert_eq!(event.key, "own");
        assert_eq!(event.origin, Some(backend.id()));
    }
}
