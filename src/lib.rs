use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VisaBridgeError>;

#[derive(Error, Debug)]
pub enum VisaBridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corpus directory not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("No documents found in the corpus directory: {}", .0.display())]
    CorpusEmpty(PathBuf),

    #[error("Embedding service error: {0}")]
    EmbeddingService(String),

    #[error("Language model service error: {0}")]
    LanguageModelService(String),

    #[error("{service} service timed out after {seconds}s")]
    ServiceTimeout { service: ServiceKind, seconds: u64 },

    #[error("Metrics persistence error: {0}")]
    MetricsPersistence(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl VisaBridgeError {
    /// Whether the failed operation may succeed if attempted again.
    #[inline]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceTimeout { .. })
    }

    /// Errors raised while constructing a bot; these abort startup.
    #[inline]
    pub const fn is_startup_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::CorpusNotFound(_) | Self::CorpusEmpty(_)
        )
    }
}

/// The external service an error or request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Embedding,
    LanguageModel,
}

impl std::fmt::Display for ServiceKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedding => f.write_str("Embedding"),
            Self::LanguageModel => f.write_str("Language model"),
        }
    }
}

pub mod bot;
pub mod commands;
pub mod config;
pub mod evaluation;
pub mod index;
pub mod ingest;
pub mod language;
pub mod memory;
pub mod responder;
pub mod services;

#[cfg(test)]
mod test_support;

pub use bot::VisaBridgeBot;
