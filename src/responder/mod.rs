// Retrieval-augmented answering
// Detect the query language, retrieve context from the index, then ask the
// language model. Failures become a visible fallback answer.

pub mod prompt;


use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::index::{SearchResult, VectorIndex};
use crate::language::{Language, detect_language};
use crate::memory::ConversationMemory;
use crate::services::LanguageModel;
use crate::{Result, VisaBridgeError};

pub use prompt::{Prompt, PromptFields, SYSTEM_INSTRUCTIONS, build_condense_prompt, build_prompt};

/// Default number of passages retrieved per query
pub const DEFAULT_SEARCH_K: usize = 3;

/// Prefix of every answer produced from a failed query
pub const FALLBACK_PREFIX: &str = "I encountered an error:";

/// Where a query is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponderState {
    #[default]
    Idle,
    Detecting,
    Retrieving,
    Generating,
    Done,
    Failed,
}

impl std::fmt::Display for ResponderState {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Detecting => "detecting",
            Self::Retrieving => "retrieving",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of one query
#[derive(Debug)]
pub struct Reply {
    /// Generated answer, or the fallback message when the query failed
    pub answer: String,
    pub language: Option<Language>,
    pub sources: Vec<SearchResult>,
    pub error: Option<VisaBridgeError>,
    pub elapsed: Duration,
    pub state: ResponderState,
}

impl Reply {
    #[inline]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Error text as recorded by the evaluator
    #[inline]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Answers queries against a shared index
pub struct Responder {
    index: Arc<VectorIndex>,
    llm: Arc<dyn LanguageModel>,
    k: usize,
    condense_follow_ups: bool,
}

impl std::fmt::Debug for Responder {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("index", &self.index)
            .field("k", &self.k)
            .field("condense_follow_ups", &self.condense_follow_ups)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Progress {
    state: ResponderState,
    language: Option<Language>,
}

impl Progress {
    fn enter(&mut self, next: ResponderState) {
        debug!("Responder state: {} -> {}", self.state, next);
        self.state = next;
    }
}

impl Responder {
    #[inline]
    pub fn new(index: Arc<VectorIndex>, llm: Arc<dyn LanguageModel>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(VisaBridgeError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            index,
            llm,
            k,
            condense_follow_ups: true,
        })
    }

    /// Rewrite follow-up questions into standalone ones before retrieval
    #[inline]
    #[must_use]
    pub const fn with_condensing(mut self, enabled: bool) -> Self {
        self.condense_follow_ups = enabled;
        self
    }

    #[inline]
    pub const fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Answer `query` in the context of `memory`.
    ///
    /// Never fails: errors are turned into a fallback answer and reported in
    /// [`Reply::error`]. Memory only grows when an answer was generated.
    #[inline]
    pub fn answer(&self, query: &str, memory: &mut ConversationMemory) -> Reply {
        let started = Instant::now();
        let mut progress = Progress::default();

        debug!("User query: {}", query);

        match self.run(query, memory, &mut progress) {
            Ok((answer, sources)) => {
                progress.enter(ResponderState::Done);
                debug!("Bot response: {}", answer);
                memory.record_exchange(query, answer.clone());
                Reply {
                    answer,
                    language: progress.language,
                    sources,
                    error: None,
                    elapsed: started.elapsed(),
                    state: ResponderState::Done,
                }
            }
            Err(e) => {
                progress.enter(ResponderState::Failed);
                error!("Error processing query: {}", e);
                Reply {
                    answer: format!("{FALLBACK_PREFIX} {e}"),
                    language: progress.language,
                    sources: Vec::new(),
                    error: Some(e),
                    elapsed: started.elapsed(),
                    state: ResponderState::Failed,
                }
            }
        }
    }

    fn run(
        &self,
        query: &str,
        memory: &ConversationMemory,
        progress: &mut Progress,
    ) -> Result<(String, Vec<SearchResult>)> {
        progress.enter(ResponderState::Detecting);
        let language = detect_language(query);
        progress.language = Some(language);
        debug!("Detected language: {}", language.code());

        progress.enter(ResponderState::Retrieving);
        let search_text = self.search_text(query, memory)?;
        let sources = self.index.search(&search_text, self.k)?;
        debug!("Retrieved {} passages", sources.len());

        progress.enter(ResponderState::Generating);
        let passages: Vec<&str> = sources.iter().map(|r| r.chunk.text.as_str()).collect();
        let prompt = build_prompt(
            &PromptFields::new(query, &passages, memory.turns()).with_language(language),
        );
        let answer = self.llm.complete(&prompt.text, prompt.history)?;

        Ok((answer, sources))
    }

    fn search_text(&self, query: &str, memory: &ConversationMemory) -> Result<String> {
        if !self.condense_follow_ups || memory.is_empty() {
            return Ok(query.to_string());
        }

        let condensed = self
            .llm
            .complete(&build_condense_prompt(memory.turns(), query), &[])?;
        let condensed = condensed.trim();
        debug!("Condensed follow-up question: {}", condensed);

        if condensed.is_empty() {
            Ok(query.to_string())
        } else {
            Ok(condensed.to_string())
        }
    }
}
