//! Store error-policy integration tests.
//!
//! Drives the engine against an instrumented backend to check silent and
//! loud failure handling end to end.

use mirrorkv::{Options, SetAction, StoreContext, StoreEngine, StoreError, TypedStore};
use mirrorkv_test_utils::{BackendOp, CountingListener, ErrorKind, ProbeBackend, RecordingSink};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Test that a fully offline backend still yields a working store.
#[test]
fn test_silent_failures_still_cache_the_default() {
    let backend = ProbeBackend::new()
        .with_read_error("medium offline")
        .with_write_error("medium offline");
    let recorder = RecordingSink::new();
    let validated = Arc::new(AtomicBool::new(false));
    let validator_ran = Arc::clone(&validated);
    let options = Options::default()
        .with_log_sink(recorder.sink())
        .with_validate_init(move |_| {
            validator_ran.store(true, Ordering::SeqCst);
            true
        });

    let engine = StoreEngine::init(
        StoreContext::new(),
        Arc::new(backend.clone()),
        "prefs",
        Some(json!("fallback")),
        options,
    )
    .expect("Silent init must not fail");

    assert_eq!(
        engine.snapshot().expect("Failed to read snapshot"),
        Some(json!("fallback"))
    );
    assert_eq!(recorder.kinds(), vec![ErrorKind::Read, ErrorKind::Write]);
    // The backend never took the value, and the validator never ran
    assert_eq!(backend.raw("prefs"), None);
    assert!(!validated.load(Ordering::SeqCst));
}

/// Test that a read failure surfaces from init when silent is off.
#[test]
fn test_loud_read_failure_propagates_from_init() {
    let backend = ProbeBackend::new().with_read_error("medium offline");
    let recorder = RecordingSink::new();
    let options = Options::default()
        .with_silent(false)
        .with_log_sink(recorder.sink());

    let result = StoreEngine::init(
        StoreContext::new(),
        Arc::new(backend),
        "prefs",
        Some(json!(1)),
        options,
    );

    assert!(matches!(result, Err(StoreError::Read { .. })));
    // Raised errors still go through the sink
    assert_eq!(recorder.kinds(), vec![ErrorKind::Read]);
}

/// Test that a loud write failure neither caches nor notifies.
#[test]
fn test_loud_write_failure_leaves_cache_cold() {
    let backend = ProbeBackend::new().with_value("prefs", "1");
    let recorder = RecordingSink::new();
    let counter = CountingListener::new();
    let options = Options::default()
        .with_silent(false)
        .with_log_sink(recorder.sink());

    let engine = StoreEngine::init(
        StoreContext::new(),
        Arc::new(backend.clone()),
        "prefs",
        Some(json!(0)),
        options,
    )
    .expect("Failed to open the store");
    let _sub = engine.subscribe(counter.listener());

    backend.fail_writes("device full");
    let result = engine.set_item(Some(json!(2)));

    assert!(matches!(result, Err(StoreError::Write { .. })));
    assert_eq!(counter.count(), 0);

    // The cache holds what the backend holds, not the unwritten value
    backend.clear_failures();
    assert_eq!(
        engine.snapshot().expect("Failed to read snapshot"),
        Some(json!(1))
    );
}

/// Test that the updater form surfaces a read failure before running.
#[test]
fn test_updater_read_failure_propagates_out_of_set_item() {
    let backend = ProbeBackend::new().with_value("prefs", "5");
    let recorder = RecordingSink::new();
    let options = Options::default()
        .with_silent(false)
        .with_log_sink(recorder.sink());

    let engine = StoreEngine::init(
        StoreContext::new(),
        Arc::new(backend.clone()),
        "prefs",
        Some(json!(0)),
        options,
    )
    .expect("Failed to open the store");

    backend.fail_reads("medium offline");
    let ran = Arc::new(AtomicBool::new(false));
    let updater_ran = Arc::clone(&ran);
    let result = engine.set_item(SetAction::update(move |current| {
        updater_ran.store(true, Ordering::SeqCst);
        current
    }));

    assert!(matches!(result, Err(StoreError::Read { .. })));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(recorder.kinds(), vec![ErrorKind::Read]);
}

/// Test that repeated snapshots hit the backend once.
#[test]
fn test_snapshot_reads_the_backend_once() {
    let backend = ProbeBackend::new().with_value("prefs", r#"{"theme":"dark"}"#);
    let engine = StoreEngine::init(
        StoreContext::new(),
        Arc::new(backend.clone()),
        "prefs",
        None,
        Options::default(),
    )
    .expect("Failed to open the store");

    for _ in 0..3 {
        assert_eq!(
            engine.snapshot().expect("Failed to read snapshot"),
            Some(json!({"theme": "dark"}))
        );
    }
    assert_eq!(backend.read_count(), 1);
    assert_eq!(backend.ops()[0], BackendOp::Contains("prefs".to_string()));
}

/// Test that undecodable data decays to null instead of raising.
#[test]
fn test_decode_failure_is_not_raised_even_when_loud() {
    let backend = ProbeBackend::new().with_value("prefs", "{not json");
    let recorder = RecordingSink::new();
    let options = Options::default()
        .with_silent(false)
        .with_log_sink(recorder.sink());

    let engine = StoreEngine::init(
        StoreContext::new(),
        Arc::new(backend.clone()),
        "prefs",
        Some(json!("seed")),
        options,
    )
    .expect("Corrupt data must not fail init");

    // The unreadable value decays to null and is removed from storage
    assert_eq!(
        engine.snapshot().expect("Failed to read snapshot"),
        Some(json!(null))
    );
    assert_eq!(recorder.kinds(), vec![ErrorKind::Decode]);
    assert_eq!(backend.raw("prefs"), None);
    assert_eq!(backend.remove_count(), 1);
}

/// Test that a failed corrupt-data cleanup is reported but never raised.
#[test]
fn test_corrupt_cleanup_failure_is_only_logged() {
    let backend = ProbeBackend::new()
        .with_value("prefs", "{not json")
        .with_remove_error("busy");
    let recorder = RecordingSink::new();
    let options = Options::default()
        .with_silent(false)
        .with_log_sink(recorder.sink());

    let engine = StoreEngine::init(
        StoreContext::new(),
        Arc::new(backend.clone()),
        "prefs",
        Some(json!("seed")),
        options,
    )
    .expect("Corrupt data must not fail init");

    assert_eq!(
        engine.snapshot().expect("Failed to read snapshot"),
        Some(json!(null))
    );
    assert_eq!(recorder.kinds(), vec![ErrorKind::Decode, ErrorKind::Write]);
    assert_eq!(backend.raw("prefs").as_deref(), Some("{not json"));
}

/// Test that typed conversion failures fall back and hit the sink.
#[test]
fn test_typed_store_reports_conversion_failures() {
    let backend = ProbeBackend::new().with_value("prefs", "5");
    let recorder = RecordingSink::new();

    let store: TypedStore<String> = TypedStore::open(
        Some(Arc::new(backend)),
        StoreContext::new(),
        "prefs",
        Some("fallback".to_string()),
        Options::default(),
    )
    .expect("Failed to open the store")
    .with_log_sink(recorder.sink());

    // 5 is valid JSON but not a string
    assert_eq!(
        store.get().expect("Failed to read value"),
        Some("fallback".to_string())
    );
    assert_eq!(recorder.kinds(), vec![ErrorKind::Decode]);
}
