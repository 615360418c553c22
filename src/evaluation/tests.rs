use tempfile::TempDir;

use super::*;

fn evaluator_in(dir: &TempDir) -> Evaluator {
    Evaluator::new(
        MetricsStore::new().into_shared(),
        dir.path().join("evaluation_metrics.json"),
        QualityThresholds::default(),
    )
}

fn report(summary: &Summary) -> &SummaryReport {
    summary.report().expect("summary has data")
}

#[test]
fn summary_without_data_is_explicit() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    evaluator.start_conversation();

    let summary = evaluator.generate_summary();

    assert_eq!(
        summary,
        Summary::NoData {
            error: NO_DATA_MESSAGE.to_string()
        }
    );
    assert_eq!(
        serde_json::to_value(&summary).expect("serializes"),
        serde_json::json!({ "error": "No data available for summary" })
    );
}

#[test]
fn error_rate_and_average_are_rounded() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    evaluator.start_conversation();

    evaluator.record_interaction("q1", "a long enough answer", 1.0, None);
    evaluator.record_interaction("q2", "a long enough answer", 2.0, Some("boom"));
    evaluator.record_interaction("q3", "a long enough answer", 2.5, None);

    let summary = evaluator.generate_summary();
    let report = report(&summary);

    assert_eq!(report.total_queries, 3);
    assert_eq!(report.total_errors, 1);
    assert!((report.error_rate - 33.33).abs() < 1e-9);
    assert!((report.average_response_time - 1.83).abs() < 1e-9);
    assert_eq!(report.total_conversations, 1);
}

#[test]
fn quality_thresholds_flag_slow_and_short_answers() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    evaluator.start_conversation();

    evaluator.record_interaction("q1", "short", 0.5, None);
    evaluator.record_interaction("q2", "a detailed answer about visas", 7.5, None);
    evaluator.record_interaction("q3", "another detailed answer", 5.0, None);

    let summary = evaluator.generate_summary();
    let report = report(&summary);

    assert_eq!(report.slow_responses, 1);
    assert_eq!(report.short_responses, 1);
}

#[test]
fn summary_does_not_change_the_store() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    evaluator.record_interaction("q", "answer text", 1.0, None);

    let before = evaluator.snapshot();
    evaluator.generate_summary();

    assert_eq!(evaluator.snapshot(), before);
}

#[test]
fn end_then_start_archives_exactly_one_session() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    evaluator.start_conversation();
    evaluator.record_interaction("q", "answer text", 1.0, None);

    let history_before = evaluator.snapshot().conversation_history.len();
    evaluator.end_conversation();
    evaluator.start_conversation();

    let store = evaluator.snapshot();
    assert_eq!(store.conversation_history.len(), history_before + 1);
    assert!(store.conversation_history[0].end_time.is_some());
    assert_eq!(store.conversation_history[0].interactions.len(), 1);
    let active = evaluator.active_session().expect("new session open");
    assert!(active.interactions.is_empty());
    assert!(active.is_open());
}

#[test]
fn starting_again_ends_the_open_session() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    let first = evaluator.start_conversation();
    evaluator.record_interaction("q", "answer text", 1.0, None);

    let second = evaluator.start_conversation();

    assert_ne!(first, second);
    let store = evaluator.snapshot();
    assert_eq!(store.total_conversations, 2);
    assert_eq!(store.conversation_history.len(), 1);
    assert_eq!(store.conversation_history[0].id, first);
    assert!(evaluator.metrics_path().exists());
}

#[test]
fn recording_without_a_session_opens_one() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);

    evaluator.record_interaction("q", "answer text", 1.0, None);

    let session = evaluator.active_session().expect("session opened");
    assert_eq!(session.interactions.len(), 1);
    assert_eq!(evaluator.snapshot().total_conversations, 1);
}

#[test]
fn errors_keep_the_failing_query() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    evaluator.start_conversation();

    evaluator.record_interaction(
        "Schengen?",
        "I encountered an error: down",
        0.1,
        Some("down"),
    );

    let store = evaluator.snapshot();
    assert_eq!(store.errors.len(), 1);
    assert_eq!(store.errors[0].query, "Schengen?");
    assert_eq!(store.errors[0].error, "down");
    let session = evaluator.active_session().expect("session open");
    assert_eq!(session.interactions[0].error.as_deref(), Some("down"));
}

#[test]
fn persisted_metrics_are_overwritten_and_reloadable() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);

    evaluator.start_conversation();
    evaluator.record_interaction("q1", "answer one", 1.0, None);
    evaluator.end_conversation();
    evaluator.start_conversation();
    evaluator.record_interaction("q2", "answer two", 2.0, Some("boom"));
    evaluator.end_conversation();

    let loaded = MetricsStore::load(evaluator.metrics_path()).expect("metrics load");

    assert_eq!(loaded, evaluator.snapshot());
    assert_eq!(loaded.conversation_history.len(), 2);
    assert_eq!(loaded.total_queries, 2);
    assert_eq!(loaded.conversation_history[1].turns().len(), 2);
}

#[test]
fn persisted_file_uses_plain_field_names() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    evaluator.start_conversation();
    evaluator.record_interaction("q", "answer text", 1.5, None);
    evaluator.end_conversation();

    let raw = fs::read_to_string(evaluator.metrics_path()).expect("file written");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");

    assert_eq!(value["total_conversations"], 1);
    assert_eq!(value["total_queries"], 1);
    assert_eq!(value["response_times"][0], 1.5);
    assert!(value["conversation_history"][0]["start_time"].is_string());
    assert!(value.get("interactions").is_none());
    assert_eq!(
        value["conversation_history"][0]["interactions"][0]["query"],
        "q"
    );
}

#[test]
fn short_responses_span_archived_and_active_sessions() {
    let dir = TempDir::new().expect("temp dir");
    let mut evaluator = evaluator_in(&dir);
    evaluator.start_conversation();
    evaluator.record_interaction("q1", "Yes.", 1.0, None);
    evaluator.record_interaction("q2", "A long enough answer.", 1.0, None);
    evaluator.end_conversation();
    evaluator.start_conversation();
    evaluator.record_interaction("q3", "No.", 1.0, None);

    let summary = evaluator.generate_summary();
    assert_eq!(report(&summary).short_responses, 2);
    assert_eq!(report(&summary).total_queries, 3);

    let persisted = MetricsStore::load(evaluator.metrics_path()).expect("metrics load");
    let archived_only = persisted.summary(&QualityThresholds::default(), None);
    assert_eq!(report(&archived_only).short_responses, 1);
}

#[test]
fn missing_metrics_file_loads_empty() {
    let dir = TempDir::new().expect("temp dir");

    let store = MetricsStore::load(&dir.path().join("absent.json")).expect("defaults");

    assert_eq!(store, MetricsStore::default());
}

#[test]
fn corrupt_metrics_file_is_a_persistence_error() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("metrics.json");
    fs::write(&path, "{ not json").expect("write");

    assert!(matches!(
        MetricsStore::load(&path),
        Err(VisaBridgeError::MetricsPersistence(_))
    ));
}

#[test]
fn failed_write_keeps_metrics_in_memory() {
    let dir = TempDir::new().expect("temp dir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "file, not a directory").expect("write");
    let mut evaluator = Evaluator::new(
        MetricsStore::new().into_shared(),
        blocker.join("metrics.json"),
        QualityThresholds::default(),
    );

    evaluator.start_conversation();
    evaluator.record_interaction("q", "answer text", 1.0, None);
    evaluator.end_conversation();

    let store = evaluator.snapshot();
    assert_eq!(store.total_queries, 1);
    assert_eq!(store.conversation_history.len(), 1);
}

#[test]
fn evaluators_sharing_metrics_do_not_lose_updates() {
    let dir = TempDir::new().expect("temp dir");
    let shared = MetricsStore::new().into_shared();

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let metrics = Arc::clone(&shared);
            let path = dir.path().join(format!("metrics-{n}.json"));
            std::thread::spawn(move || {
                let mut evaluator = Evaluator::new(metrics, path, QualityThresholds::default());
                evaluator.start_conversation();
                for i in 0..25 {
                    evaluator.record_interaction(&format!("q{i}"), "answer text", 0.1, None);
                }
                evaluator.end_conversation();
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread finished");
    }

    let store = shared.lock().expect("lock");
    assert_eq!(store.total_queries, 100);
    assert_eq!(store.response_times.len(), 100);
    assert_eq!(store.total_conversations, 4);
    assert_eq!(store.conversation_history.len(), 4);
}
