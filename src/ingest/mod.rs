// Document ingestion
// Loads the plain-text corpus and splits it into overlapping character windows


use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Result, VisaBridgeError};

/// A bounded window of a source document, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `<file name>#<position within that file>`
    pub id: String,
    pub source_file: String,
    pub text: String,
    /// Position across the whole corpus, in load order
    pub ordinal: usize,
}

/// Character-count chunking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of one document
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(VisaBridgeError::InvalidArgument(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(VisaBridgeError::InvalidArgument(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    const fn step(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

/// A loaded corpus file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub file_name: String,
    pub path: PathBuf,
    pub text: String,
}

/// Read every `.txt` file directly inside `dir`, sorted by file name.
///
/// Unreadable files are logged and skipped; the call only fails when the
/// directory is missing or nothing could be loaded.
#[inline]
pub fn load_documents(dir: &Path) -> Result<Vec<SourceDocument>> {
    if !dir.is_dir() {
        return Err(VisaBridgeError::CorpusNotFound(dir.to_path_buf()));
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable corpus directory entry: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!("Loaded {} ({} bytes)", file_name, text.len());
                documents.push(SourceDocument {
                    file_name,
                    path,
                    text,
                });
            }
            Err(e) => {
                warn!("Skipping document {}: {}", file_name, e);
            }
        }
    }

    if documents.is_empty() {
        return Err(VisaBridgeError::CorpusEmpty(dir.to_path_buf()));
    }

    info!("Loaded {} documents from {}", documents.len(), dir.display());
    Ok(documents)
}

/// Split `text` into windows of at most `chunk_size` characters, each
/// starting `chunk_size - chunk_overlap` characters after the previous one.
/// The final window always ends at the end of the text.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<String>> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += config.step();
    }

    Ok(pieces)
}

/// Chunk every document, numbering chunks across the whole corpus
#[inline]
pub fn chunk_documents(
    documents: &[SourceDocument],
    config: &ChunkingConfig,
) -> Result<Vec<DocumentChunk>> {
    let mut chunks = Vec::new();

    for document in documents {
        let pieces = split_text(&document.text, config)?;
        debug!("Split {} into {} chunks", document.file_name, pieces.len());

        for (position, text) in pieces.into_iter().enumerate() {
            chunks.push(DocumentChunk {
                id: format!("{}#{}", document.file_name, position),
                source_file: document.file_name.clone(),
                text,
                ordinal: chunks.len(),
            });
        }
    }

    Ok(chunks)
}

/// Load and chunk a corpus directory in one step
#[inline]
pub fn ingest_corpus(dir: &Path, config: &ChunkingConfig) -> Result<Vec<DocumentChunk>> {
    config.validate()?;
    let documents = load_documents(dir)?;
    let chunks = chunk_documents(&documents, config)?;

    // Only blank files were found
    if chunks.is_empty() {
        return Err(VisaBridgeError::CorpusEmpty(dir.to_path_buf()));
    }

    info!(
        "Ingested {} chunks from {} documents (size {}, overlap {})",
        chunks.len(),
        documents.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(chunks)
}
