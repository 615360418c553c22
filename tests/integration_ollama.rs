#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use std::env;
use std::time::Duration;

use tracing::info;
use visabridge::config::ServiceConfig;
use visabridge::memory::ConversationTurn;
use visabridge::services::{ChatClient, EmbeddingClient, Embedder, HttpTransport, LanguageModel};

const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn service_config() -> ServiceConfig {
    let mut service = ServiceConfig {
        host: env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string()),
        port: env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_OLLAMA_PORT),
        ..ServiceConfig::default()
    };
    if let Ok(model) = env::var("OLLAMA_EMBED_MODEL") {
        service.embedding_model = model;
    }
    if let Ok(model) = env::var("OLLAMA_CHAT_MODEL") {
        service.chat_model = model;
    }
    service
}

fn transport(service: &ServiceConfig) -> HttpTransport {
    HttpTransport::from_config(service)
        .expect("Failed to create transport")
        .with_timeout(Duration::from_secs(120))
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_ping() {
    init_test_tracing();

    let result = transport(&service_config()).ping();

    assert!(
        result.is_ok(),
        "Ping should succeed with local Ollama: {:?}",
        result
    );
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_embeddings_share_a_dimension() {
    init_test_tracing();
    let service = service_config();
    let client = EmbeddingClient::with_transport(transport(&service), &service);

    let vectors = client
        .embed_batch(&[
            "Schengen visa requirements".to_string(),
            "شینگن ویزا کی شرائط".to_string(),
        ])
        .expect("embeddings generated");

    info!("Embedding dimension: {}", vectors[0].len());
    assert_eq!(vectors.len(), 2);
    assert!(!vectors[0].is_empty());
    assert_eq!(vectors[0].len(), vectors[1].len());
}

#[test]
#[ignore = "requires a local Ollama instance"]
fn real_ollama_chat_completion() {
    init_test_tracing();
    let service = service_config();
    let client = ChatClient::with_transport(transport(&service), &service);

    let answer = client
        .complete(
            "Answer in one word: which continent is France in?",
            &[ConversationTurn::user("Hello"), ConversationTurn::assistant("Hi!")],
        )
        .expect("completion generated");

    info!("Answer: {}", answer);
    assert!(!answer.trim().is_empty());
}
