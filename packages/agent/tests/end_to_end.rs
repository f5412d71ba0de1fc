// packages/agent/tests/end_to_end.rs
//! End-to-end behavior through isolated diagnostic contexts

use bytes::Bytes;
use parking_lot::Mutex;
use periscope_agent::capture::{
    CaptureStore, ConsoleLine, Coordinate, FaultKind, LocationSource, Payload, StreamTag,
};
use periscope_agent::inspection::{KeyValueNamespace, MemoryNamespaceProvider, NamespaceProvider};
use periscope_agent::interception::console::{STDERR_ENTRY_POINT, STDOUT_ENTRY_POINT};
use periscope_agent::interception::fault::FaultRecorder;
use periscope_agent::interception::location::CURRENT_LOCATION;
use periscope_agent::interception::FaultSlot;
use periscope_agent::redirect::{Original, RedirectionTable};
use periscope_agent::{AgentConfig, AgentOption, DiagnosticContext, Domain, InterceptorId};
use serde_json::json;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Written = Arc<Mutex<Vec<(StreamTag, Vec<u8>)>>>;

fn quiet_config(dir: &tempfile::TempDir) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.fault.slot_path = dir.path().join("fault.json");
    config.fault.capture_signals = false;
    config
}

/// Table whose console originals record what reached the "real" streams
fn recording_table() -> (Arc<RedirectionTable>, Written) {
    let table = Arc::new(RedirectionTable::new());
    let written: Written = Arc::new(Mutex::new(Vec::new()));
    for (id, stream) in [
        (STDOUT_ENTRY_POINT, StreamTag::Stdout),
        (STDERR_ENTRY_POINT, StreamTag::Stderr),
    ] {
        let sink = Arc::clone(&written);
        table
            .register(id, move |bytes: Bytes| {
                sink.lock().push((stream, bytes.to_vec()));
            })
            .unwrap();
    }
    (table, written)
}

fn all_except(enabled: InterceptorId) -> Vec<InterceptorId> {
    InterceptorId::ALL
        .iter()
        .copied()
        .filter(|id| *id != enabled)
        .collect()
}

#[test]
fn test_console_only_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (table, written) = recording_table();
    let context = DiagnosticContext::with_parts(
        quiet_config(&dir),
        table,
        Arc::new(MemoryNamespaceProvider::new()),
    );
    context
        .setup([], all_except(InterceptorId::Console), Vec::new())
        .unwrap();

    writeln!(context.console_writer(StreamTag::Stdout), "to stdout").unwrap();
    writeln!(context.console_writer(StreamTag::Stderr), "to stderr").unwrap();

    let events = context.inspector().list(Domain::Console);
    assert_eq!(events.len(), 2);

    let lines: Vec<ConsoleLine> = events
        .iter()
        .map(|event| match &event.payload {
            Payload::Console(line) => (**line).clone(),
            other => panic!("unexpected payload {:?}", other.domain()),
        })
        .collect();
    assert_eq!(lines[0].stream, StreamTag::Stdout);
    assert_eq!(lines[0].text, "to stdout");
    assert_eq!(lines[1].stream, StreamTag::Stderr);
    assert_eq!(lines[1].text, "to stderr");
    assert!(lines[0].sequence < lines[1].sequence);

    // The original streams saw the bytes unmodified
    let received = |stream: StreamTag| -> Vec<u8> {
        written
            .lock()
            .iter()
            .filter(|(tag, _)| *tag == stream)
            .flat_map(|(_, bytes)| bytes.clone())
            .collect()
    };
    assert_eq!(received(StreamTag::Stdout), b"to stdout\n".to_vec());
    assert_eq!(received(StreamTag::Stderr), b"to stderr\n".to_vec());
}

#[test]
fn test_double_install_reaches_original_once() {
    let table = RedirectionTable::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    table
        .register("host.save", move |_: String| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let wrap = |o: &Original<String, ()>, document: String| o.call(document);
    assert!(table.install("host.save", "first", wrap).unwrap());
    assert!(!table.install("host.save", "second", wrap).unwrap());

    table
        .call::<String, ()>("host.save", "draft".to_string())
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(table.records().len(), 1);
    assert_eq!(table.records()[0].owner, "first");
}

#[test]
fn test_location_override_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let context = Arc::new(DiagnosticContext::new(quiet_config(&dir)));
    context
        .table()
        .register(CURRENT_LOCATION, |_: ()| Some(Coordinate::new(48.85, 2.35)))
        .unwrap();
    context
        .setup([], [InterceptorId::Fault], Vec::new())
        .unwrap();

    context.location().simulate(Coordinate::new(10.0, 20.0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let c = Arc::clone(&context);
            std::thread::spawn(move || {
                for _ in 0..25 {
                    assert_eq!(
                        c.current_location().unwrap(),
                        Some(Coordinate::new(10.0, 20.0))
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    context.location().clear_simulation();
    assert_eq!(
        context.current_location().unwrap(),
        Some(Coordinate::new(48.85, 2.35))
    );

    let simulated = context.inspector().filter_by(Domain::Location, |payload| {
        matches!(payload, Payload::Location(q) if q.source == LocationSource::Simulated)
    });
    assert_eq!(simulated.len(), 400);
}

#[test]
fn test_list_keys_shows_namespace_specific_keys() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(MemoryNamespaceProvider::new());
    let context = DiagnosticContext::with_parts(
        quiet_config(&dir),
        Arc::new(RedirectionTable::new()),
        provider.clone(),
    );
    context
        .setup(
            [],
            InterceptorId::ALL,
            vec![AgentOption::KeyValueNamespaces(vec!["suite".to_string()])],
        )
        .unwrap();

    provider.standard().set("a", json!(1));
    let suite = provider.open("suite").unwrap();
    suite.set("a", json!(2));
    suite.set("b", json!(3));

    let inspector = context.inspector();
    assert_eq!(inspector.list_keys("suite").unwrap(), vec!["b".to_string()]);
}

#[test]
fn test_faults_persist_and_surface_once() {
    let dir = tempfile::tempdir().unwrap();
    let slot_path = dir.path().join("fault.json");

    // Signal path, then process "restart"
    let first = FaultRecorder::new(
        Arc::new(CaptureStore::with_capacity(10)),
        FaultSlot::new(&slot_path),
    );
    first
        .record(
            FaultKind::Signal {
                number: 6,
                name: "SIGABRT".to_string(),
            },
            "Fatal signal SIGABRT received",
            None,
        )
        .unwrap();
    assert!(!FaultSlot::new(&slot_path).is_empty());

    let restarted = FaultRecorder::new(
        Arc::new(CaptureStore::with_capacity(10)),
        FaultSlot::new(&slot_path),
    );
    let surfaced = restarted.recover_pending().unwrap().unwrap();
    assert!(matches!(surfaced.payload.kind, FaultKind::Signal { number: 6, .. }));
    assert!(restarted.recover_pending().unwrap().is_none());
    assert!(FaultSlot::new(&slot_path).is_empty());

    // Panic path
    let second = FaultRecorder::new(
        Arc::new(CaptureStore::with_capacity(10)),
        FaultSlot::new(&slot_path),
    );
    second
        .record(FaultKind::Panic, "called `Option::unwrap()` on a `None` value", None)
        .unwrap();

    let restarted = FaultRecorder::new(
        Arc::new(CaptureStore::with_capacity(10)),
        FaultSlot::new(&slot_path),
    );
    let surfaced = restarted.recover_pending().unwrap().unwrap();
    assert_eq!(surfaced.payload.kind, FaultKind::Panic);
    assert!(surfaced.payload.recovered);
    assert!(FaultSlot::new(&slot_path).is_empty());
}

#[test]
fn test_clear_all_empties_list_and_filter() {
    let dir = tempfile::tempdir().unwrap();
    let (table, _) = recording_table();
    let context = DiagnosticContext::with_parts(
        quiet_config(&dir),
        table,
        Arc::new(MemoryNamespaceProvider::new()),
    );
    context
        .setup([], [InterceptorId::Fault], Vec::new())
        .unwrap();

    writeln!(context.console_writer(StreamTag::Stdout), "anything").unwrap();
    context.network().mock_request("http://anything.test/");

    let inspector = context.inspector();
    assert_eq!(inspector.clear_all(), 2);
    for domain in Domain::ALL {
        assert!(inspector.list(domain).is_empty());
        assert!(inspector.filter(domain, "anything").is_empty());
    }
}

#[tokio::test]
async fn test_mocked_request_through_client() {
    let dir = tempfile::tempdir().unwrap();
    let context = DiagnosticContext::new(quiet_config(&dir));
    context
        .setup([], all_except(InterceptorId::Network), Vec::new())
        .unwrap();

    context.network().register_mock(
        "api.example.test",
        periscope_agent::interception::MockResponse::json(200, &json!({ "ok": true })),
    );
    let response = context
        .network_client()
        .get("http://api.example.test/health")
        .await
        .unwrap();
    assert_eq!(response.body, Bytes::from(r#"{"ok":true}"#));

    let exchanges = context.inspector().filter(Domain::Network, "HEALTH");
    assert_eq!(exchanges.len(), 1);
}
