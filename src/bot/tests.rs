use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::*;
use crate::VisaBridgeError;
use crate::config::Provider;
use crate::index::DistanceMetric;
use crate::ingest::DocumentChunk;
use crate::services::Embedder;
use crate::test_support::{KeywordEmbedder, ScriptedModel};

const VOCABULARY: &[&str] = &["schengen", "canada", "fee", "passport"];

fn config_in(dir: &TempDir) -> Config {
    let mut config = Config {
        base_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    config.corpus.data_directory = dir.path().join("data");
    config.retrieval.k = 2;
    config
}

fn build_index(embedder: &Arc<KeywordEmbedder>) -> Arc<VectorIndex> {
    let chunks = [
        "Schengen visas allow stays of up to 90 days.",
        "Canada visitor visa fee is 100 CAD.",
        "A passport must be valid for six months.",
    ]
    .iter()
    .enumerate()
    .map(|(ordinal, text)| DocumentChunk {
        id: format!("guide.txt#{ordinal}"),
        source_file: "guide.txt".to_string(),
        text: (*text).to_string(),
        ordinal,
    })
    .collect();

    Arc::new(
        VectorIndex::build(
            chunks,
            Arc::clone(embedder) as Arc<dyn Embedder>,
            DistanceMetric::Cosine,
        )
        .expect("index builds"),
    )
}

fn bot_with(dir: &TempDir, model: ScriptedModel) -> (VisaBridgeBot, Arc<KeywordEmbedder>) {
    let embedder = Arc::new(KeywordEmbedder::new(VOCABULARY));
    let bot = VisaBridgeBot::with_components(
        &config_in(dir),
        build_index(&embedder),
        Arc::new(model),
        MetricsStore::new().into_shared(),
    )
    .expect("bot assembles");
    (bot, embedder)
}

#[test]
fn chat_answers_and_records() {
    let dir = TempDir::new().expect("temp dir");
    let (mut bot, _) = bot_with(&dir, ScriptedModel::answering("Up to 90 days."));
    bot.start_conversation();

    let answer = bot.chat("How long is a Schengen stay?");

    assert_eq!(answer, "Up to 90 days.");
    assert_eq!(bot.memory().len(), 2);
    let store = bot.evaluator().snapshot();
    assert_eq!(store.total_queries, 1);
    assert!(store.errors.is_empty());
}

#[test]
fn service_failure_is_contained_and_recorded() {
    let dir = TempDir::new().expect("temp dir");
    let (mut bot, embedder) = bot_with(&dir, ScriptedModel::answering("unused"));
    bot.start_conversation();
    embedder.fail();

    let answer = bot.chat("Schengen?");

    assert!(answer.starts_with("I encountered an error:"));
    let store = bot.evaluator().snapshot();
    assert_eq!(store.total_queries, 1);
    assert_eq!(store.errors.len(), 1);
    let session = bot.evaluator().active_session().expect("session open");
    assert!(session.interactions[0].error.is_some());
    assert!(bot.memory().is_empty());
}

#[test]
fn respond_exposes_sources() {
    let dir = TempDir::new().expect("temp dir");
    let (mut bot, _) = bot_with(&dir, ScriptedModel::answering("100 CAD."));

    let reply = bot.respond("Canada fee?");

    assert_eq!(reply.sources.len(), 2);
    assert_eq!(reply.sources[0].chunk.id, "guide.txt#1");
}

#[test]
fn end_conversation_persists_and_summarises() {
    let dir = TempDir::new().expect("temp dir");
    let (mut bot, _) = bot_with(&dir, ScriptedModel::answering("A passport is required."));
    bot.start_conversation();
    bot.chat("Passport rules?");

    let summary = bot.end_conversation();

    let report = summary.report().expect("one query recorded");
    assert_eq!(report.total_queries, 1);
    assert_eq!(report.total_conversations, 1);
    assert!(dir.path().join("evaluation_metrics.json").exists());
    assert!(bot.memory().is_empty());
}

#[test]
fn clear_conversation_starts_fresh() {
    let dir = TempDir::new().expect("temp dir");
    let (mut bot, _) = bot_with(&dir, ScriptedModel::answering("Answer text."));
    let first = bot.start_conversation();
    bot.chat("Schengen?");

    let second = bot.clear_conversation();

    assert_ne!(first, second);
    assert!(bot.memory().is_empty());
    let store = bot.evaluator().snapshot();
    assert_eq!(store.conversation_history.len(), 1);
    assert_eq!(store.total_conversations, 2);
    assert!(
        bot.evaluator()
            .active_session()
            .is_some_and(|s| s.interactions.is_empty())
    );
}

#[test]
fn summary_before_any_query_has_no_data() {
    let dir = TempDir::new().expect("temp dir");
    let (mut bot, _) = bot_with(&dir, ScriptedModel::answering("unused"));
    bot.start_conversation();

    assert!(matches!(bot.generate_summary(), Summary::NoData { .. }));
}

#[test]
fn bots_can_share_index_and_metrics() {
    let dir = TempDir::new().expect("temp dir");
    let embedder = Arc::new(KeywordEmbedder::new(VOCABULARY));
    let index = build_index(&embedder);
    let metrics = MetricsStore::new().into_shared();
    let config = config_in(&dir);

    let mut first = VisaBridgeBot::with_components(
        &config,
        Arc::clone(&index),
        Arc::new(ScriptedModel::answering("first answer")),
        Arc::clone(&metrics),
    )
    .expect("bot assembles");
    let mut second = VisaBridgeBot::with_components(
        &config,
        Arc::clone(&index),
        Arc::new(ScriptedModel::answering("second answer")),
        Arc::clone(&metrics),
    )
    .expect("bot assembles");

    first.chat("Schengen?");
    second.chat("Canada?");

    assert_eq!(first.memory().len(), 2);
    assert_eq!(second.memory().len(), 2);
    assert_eq!(first.evaluator().snapshot().total_queries, 2);
    assert!(Arc::ptr_eq(first.index(), second.index()));
}

#[test]
fn missing_corpus_aborts_startup() {
    let dir = TempDir::new().expect("temp dir");
    let config = config_in(&dir);

    let err = VisaBridgeBot::new(&config).expect_err("no data directory");

    assert!(matches!(err, VisaBridgeError::CorpusNotFound(_)));
    assert!(err.is_startup_error());
}

#[test]
fn empty_corpus_aborts_startup() {
    let dir = TempDir::new().expect("temp dir");
    fs::create_dir(dir.path().join("data")).expect("create data dir");
    fs::write(dir.path().join("data").join("notes.md"), "not a text file").expect("write");

    let err = VisaBridgeBot::new(&config_in(&dir)).expect_err("no .txt files");

    assert!(matches!(err, VisaBridgeError::CorpusEmpty(_)));
}

#[test]
#[serial]
fn openai_without_key_aborts_startup() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    config.service.provider = Provider::OpenAi;
    config.service.api_key_env = "VISABRIDGE_TEST_MISSING_KEY".to_string();
    // SAFETY: serialized with the other environment tests
    unsafe {
        env::remove_var("VISABRIDGE_TEST_MISSING_KEY");
    }

    let err = VisaBridgeBot::new(&config).expect_err("key missing");

    assert!(matches!(err, VisaBridgeError::Configuration(ref m) if m.contains("VISABRIDGE_TEST_MISSING_KEY")));
}

#[test]
fn resume_continues_persisted_counters() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = config_in(&dir);
    let previous = MetricsStore {
        total_conversations: 3,
        total_queries: 7,
        ..MetricsStore::default()
    };
    previous
        .persist(&config.metrics_path())
        .expect("seed metrics");

    config.evaluation.resume = true;
    assert_eq!(load_metrics(&config).lock().expect("lock").total_queries, 7);

    config.evaluation.resume = false;
    assert_eq!(load_metrics(&config).lock().expect("lock").total_queries, 0);
}
