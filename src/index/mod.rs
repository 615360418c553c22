
use std::cmp::Ordering;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ingest::DocumentChunk;
use crate::services::Embedder;
use crate::{Result, VisaBridgeError};

/// How the distance between two embeddings is measured; smaller is closer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`
    #[default]
    Cosine,
    /// Negated dot product
    InnerProduct,
    /// Squared Euclidean distance
    L2,
}

impl std::fmt::Display for DistanceMetric {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::InnerProduct => f.write_str("inner_product"),
            Self::L2 => f.write_str("l2"),
        }
    }
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub chunk: DocumentChunk,
    pub distance: f32,
}

#[derive(Debug)]
struct IndexEntry {
    vector: Vec<f32>,
    norm: f32,
    chunk: DocumentChunk,
}

/// Exact nearest-neighbour index over embedded chunks.
///
/// Built once and immutable afterwards, so it can be shared behind an `Arc`
/// by any number of readers.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    metric: DistanceMetric,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for VectorIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("entries", &self.entries.len())
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Embed every chunk and build the index
    #[inline]
    pub fn build(
        chunks: Vec<DocumentChunk>,
        embedder: Arc<dyn Embedder>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        info!("Building vector index over {} chunks", chunks.len());

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(chunks.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding corpus {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let batch_size = embedder.batch_size().max(1);
        let mut entries = Vec::with_capacity(chunks.len());
        let mut dimension = 0;

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts)?;

            if vectors.len() != batch.len() {
                bar.abandon();
                return Err(VisaBridgeError::EmbeddingService(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for (vector, chunk) in vectors.into_iter().zip(batch) {
                if dimension == 0 {
                    dimension = vector.len();
                }
                if let Err(e) = validate_vector(&vector, dimension) {
                    bar.abandon();
                    return Err(e);
                }
                entries.push(IndexEntry {
                    norm: norm(&vector),
                    vector,
                    chunk: chunk.clone(),
                });
            }

            bar.inc(batch.len() as u64);
            debug!("Embedded {}/{} chunks", entries.len(), chunks.len());
        }

        bar.finish_and_clear();
        info!(
            "Vector index built: {} vectors of dimension {} ({} distance)",
            entries.len(),
            dimension,
            metric
        );

        Ok(Self {
            entries,
            dimension,
            metric,
            embedder,
        })
    }

    /// Embed `query` and return the `min(k, len)` closest chunks, closest
    /// first; equal distances keep corpus order.
    #[inline]
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(VisaBridgeError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query)?;
        self.search_by_vector(&vector, k)
    }

    #[inline]
    pub fn search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(VisaBridgeError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        validate_vector(query, self.dimension)?;

        let query_norm = norm(query);
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (self.distance(query, query_norm, entry), entry))
            .collect();

        let by_distance = |a: &(f32, &IndexEntry), b: &(f32, &IndexEntry)| -> Ordering {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.chunk.ordinal.cmp(&b.1.chunk.ordinal))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance);

        Ok(scored
            .into_iter()
            .map(|(distance, entry)| SearchResult {
                chunk: entry.chunk.clone(),
                distance,
            })
            .collect())
    }

    fn distance(&self, query: &[f32], query_norm: f32, entry: &IndexEntry) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => {
                let denominator = query_norm * entry.norm;
                if denominator == 0.0 {
                    1.0
                } else {
                    1.0 - dot(query, &entry.vector) / denominator
                }
            }
            DistanceMetric::InnerProduct => -dot(query, &entry.vector),
            DistanceMetric::L2 => query
                .iter()
                .zip(&entry.vector)
                .fold(0.0, |acc, (a, b)| (a - b).mul_add(a - b, acc)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub const fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Indexed chunks in build order
    #[inline]
    pub fn chunks(&self) -> impl Iterator<Item = &DocumentChunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }
}

fn validate_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(VisaBridgeError::EmbeddingService(
            "service returned an empty embedding".to_string(),
        ));
    }
    if vector.len() != dimension {
        return Err(VisaBridgeError::EmbeddingService(format!(
            "embedding dimension mismatch: expected {}, got {}",
            dimension,
            vector.len()
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(VisaBridgeError::EmbeddingService(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).fold(0.0, |acc, (x, y)| x.mul_add(*y, acc))
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}
