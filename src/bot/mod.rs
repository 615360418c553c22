// The assembled assistant
// Wires ingestion, the vector index, the model services, conversation memory
// and the evaluator behind a small conversational API.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::evaluation::{Evaluator, MetricsStore, QualityThresholds, SharedMetrics, Summary};
use crate::index::VectorIndex;
use crate::ingest::ingest_corpus;
use crate::memory::ConversationMemory;
use crate::responder::{Reply, Responder};
use crate::services::{ChatClient, EmbeddingClient, LanguageModel};
use crate::Result;

/// A retrieval-augmented visa assistant holding one conversation at a time
#[derive(Debug)]
pub struct VisaBridgeBot {
    responder: Responder,
    memory: ConversationMemory,
    evaluator: Evaluator,
}

impl VisaBridgeBot {
    /// Ingest the corpus, build the index and connect the model services.
    ///
    /// Any failure here aborts construction; there is no partially usable bot.
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let embedder = EmbeddingClient::new(&config.service)?;
        let llm = ChatClient::new(&config.service)?;
        info!(
            "Using {} at {} (embeddings: {}, chat: {})",
            config.service.provider,
            config.service_url()?,
            embedder.model(),
            llm.model()
        );

        let chunks = ingest_corpus(config.corpus_dir(), &config.corpus.chunking())?;
        let index = VectorIndex::build(chunks, Arc::new(embedder), config.retrieval.distance)?;

        Self::with_components(config, Arc::new(index), Arc::new(llm), load_metrics(config))
    }

    /// Assemble a bot from an already built index and services.
    ///
    /// Several bots may share one index and one metrics store.
    #[inline]
    pub fn with_components(
        config: &Config,
        index: Arc<VectorIndex>,
        llm: Arc<dyn LanguageModel>,
        metrics: SharedMetrics,
    ) -> Result<Self> {
        let responder = Responder::new(index, llm, config.retrieval.k)?
            .with_condensing(config.retrieval.condense_follow_ups);
        let evaluator = Evaluator::new(
            metrics,
            config.metrics_path(),
            QualityThresholds::from(&config.evaluation),
        );

        Ok(Self {
            responder,
            memory: ConversationMemory::new(),
            evaluator,
        })
    }

    /// Answer a query; failures come back as an "I encountered an error" answer
    #[inline]
    pub fn chat(&mut self, query: &str) -> String {
        self.respond(query).answer
    }

    /// Answer a query and return the full reply, including retrieved sources
    #[inline]
    pub fn respond(&mut self, query: &str) -> Reply {
        let reply = self.responder.answer(query, &mut self.memory);
        self.evaluator.record_interaction(
            query,
            &reply.answer,
            reply.elapsed.as_secs_f64(),
            reply.error_message().as_deref(),
        );
        reply
    }

    /// Begin a new conversation with empty memory
    #[inline]
    pub fn start_conversation(&mut self) -> Uuid {
        self.memory.clear();
        self.evaluator.start_conversation()
    }

    /// Finish the conversation, persist metrics and summarise
    #[inline]
    pub fn end_conversation(&mut self) -> Summary {
        self.evaluator.end_conversation();
        self.memory.clear();
        self.evaluator.generate_summary()
    }

    /// Forget the conversation so far and start a fresh one
    #[inline]
    pub fn clear_conversation(&mut self) -> Uuid {
        let id = self.start_conversation();
        info!("Conversation cleared and new session started");
        id
    }

    #[inline]
    pub fn generate_summary(&self) -> Summary {
        self.evaluator.generate_summary()
    }

    #[inline]
    pub const fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    #[inline]
    pub const fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    #[inline]
    pub fn index(&self) -> &Arc<VectorIndex> {
        self.responder.index()
    }
}

fn load_metrics(config: &Config) -> SharedMetrics {
    if !config.evaluation.resume {
        return MetricsStore::new().into_shared();
    }

    let path = config.metrics_path();
    match MetricsStore::load(&path) {
        Ok(store) => {
            info!(
                "Resuming metrics from {} ({} queries so far)",
                path.display(),
                store.total_queries
            );
            store.into_shared()
        }
        Err(e) => {
            warn!("Starting with fresh metrics: {}", e);
            MetricsStore::new().into_shared()
        }
    }
}
