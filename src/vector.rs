//! Dense vector index over chunk embeddings.
//!
//! Vectors come from the [`Embedder`] and are persisted through the cache
//! (kind [`IndexKind::Embeddings`]) keyed by chunk width and embedding
//! model, so changing either starts a fresh file.
//!
//! Queries are brute force: cosine similarity against every stored vector,
//! then a stable descending sort. Journals are small enough that this beats
//! maintaining an ANN structure.

use anyhow::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

use crate::cache::{build_incremental, BuildSummary, Fingerprint, IndexCache, IndexKind};
use crate::chunk::Window;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::RetrievalError;
use crate::models::{Chunk, ScoredChunk};
use crate::progress::BuildProgressReporter;
use crate::ranking::rank_scores;

/// Parameters that invalidate cached embeddings.
#[derive(Debug, Serialize)]
struct EmbeddingParams<'a> {
    window: Window,
    model: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    vectors: IndexMap<String, Vec<f32>>,
}

impl VectorIndex {
    pub fn from_vectors(vectors: IndexMap<String, Vec<f32>>) -> Self {
        Self { vectors }
    }

    /// Embed every chunk not yet cached and return the full index.
    ///
    /// Each chunk is embedded with its date line, the same text the answer
    /// prompt will later show.
    pub fn build(
        chunks: &[Chunk],
        window: Window,
        embedder: &dyn Embedder,
        cache_dir: &Path,
        flush_every: usize,
        progress: &dyn BuildProgressReporter,
    ) -> Result<(Self, BuildSummary)> {
        let fingerprint = Fingerprint::of(&EmbeddingParams {
            window,
            model: embedder.model_name(),
        })?;
        let cache = IndexCache::new(cache_dir, IndexKind::Embeddings, fingerprint);
        let (vectors, summary) = build_incremental(
            &cache,
            chunks,
            |c| c.id.as_str(),
            flush_every,
            progress,
            |c| embedder.embed(&c.display_text()),
        )?;
        Ok((Self { vectors }, summary))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn get(&self, chunk_id: &str) -> Option<&[f32]> {
        self.vectors.get(chunk_id).map(Vec::as_slice)
    }

    /// Score every chunk against `query`, most similar first.
    ///
    /// # Errors
    ///
    /// [`RetrievalError::DimensionMismatch`] as soon as one stored vector
    /// differs in length from the query.
    pub fn rank(&self, query: &[f32]) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let mut scores = IndexMap::with_capacity(self.vectors.len());
        for (chunk_id, vector) in &self.vectors {
            let similarity = cosine_similarity(query, vector)?;
            scores.insert(chunk_id.clone(), similarity as f64);
        }
        Ok(rank_scores(scores))
    }
}
