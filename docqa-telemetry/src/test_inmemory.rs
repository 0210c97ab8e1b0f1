use std::sync::Arc;
use tracing::info_span;
use tracing_subscriber::layer::SubscriberExt;

use crate::memory::{InMemoryTraceLayer, SharedTraceStorage};
use crate::{LogFormat, init_telemetry, init_with_storage};

fn capturing(storage: &Arc<SharedTraceStorage>) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry().with(InMemoryTraceLayer::new(storage.clone()))
}

#[test]
fn test_span_captured_under_request_id() {
    let storage = Arc::new(SharedTraceStorage::new());

    tracing::subscriber::with_default(capturing(&storage), || {
        let span = info_span!("engine.ingest", request.id = "req-123", file_count = 2u64, replace = true);
        let _guard = span.enter();
        tracing::info!("ingesting");
    });

    let spans = storage.get_trace("req-123").expect("spans under request id");
    assert_eq!(spans.len(), 1);

    let span = &spans[0];
    assert_eq!(span.name, "engine.ingest");
    assert_eq!(span.trace_id, "req-123");
    assert_eq!(span.attributes["file_count"], serde_json::json!(2));
    assert_eq!(span.attributes["replace"], serde_json::json!(true));
    assert!(span.start_time > 0);
    assert!(span.duration_nanos().is_some());
}

#[test]
fn test_child_span_inherits_request_id() {
    let storage = Arc::new(SharedTraceStorage::new());

    tracing::subscriber::with_default(capturing(&storage), || {
        let parent = info_span!("engine.retrieve", request.id = "req-456");
        let _parent = parent.enter();
        let child = info_span!("store.search", k = 3u64);
        let _child = child.enter();
    });

    let spans = storage.get_trace("req-456").expect("spans under request id");
    let names: Vec<_> = spans.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["store.search", "engine.retrieve"]);
    assert_eq!(spans[0].parent_span_id.as_deref(), Some(spans[1].span_id.as_str()));
}

#[test]
fn test_spans_without_request_id_are_ignored() {
    let storage = Arc::new(SharedTraceStorage::new());

    tracing::subscriber::with_default(capturing(&storage), || {
        let _guard = info_span!("background.task").entered();
    });

    assert!(storage.request_ids().is_empty());
    assert!(storage.spans_named("background.task").is_empty());
}

#[test]
fn test_clear_and_lookup_by_name() {
    let storage = Arc::new(SharedTraceStorage::new());

    tracing::subscriber::with_default(capturing(&storage), || {
        let _a = info_span!("engine.reset", request.id = "a").entered();
        drop(_a);
        let _b = info_span!("engine.reset", request.id = "b").entered();
    });

    assert_eq!(storage.spans_named("engine.reset").len(), 2);
    storage.clear();
    assert!(storage.get_trace("a").is_none());
}

#[test]
fn test_log_format_parsing() {
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert!("xml".parse::<LogFormat>().is_err());
    assert_eq!(LogFormat::default().to_string(), "pretty");
}

#[test]
fn test_global_init_captures_and_only_once() {
    let storage = Arc::new(SharedTraceStorage::new());
    assert!(init_with_storage("test-service", LogFormat::Json, storage.clone()).is_ok());

    let span = info_span!("engine.reset", request.id = "global-1");
    span.in_scope(|| tracing::info!("resetting"));
    drop(span);

    let spans = storage.get_trace("global-1").expect("global subscriber captured span");
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "engine.reset");

    assert!(init_telemetry("test-service", LogFormat::Pretty).is_err());
    assert!(init_with_storage("test-service", LogFormat::Json, storage).is_err());
}
