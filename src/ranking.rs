//! Ranked results and forward-only pagination.
//!
//! Every index produces a per-chunk score accumulator in discovery order.
//! [`rank_scores`] turns it into a descending ranking with a stable sort,
//! so ties keep the order in which chunks were first scored and identical
//! queries always produce identical rankings.
//!
//! A [`Pager`] hands the ranking out one [`Page`] at a time for the chat
//! "more" interaction. It only moves forward.

use indexmap::IndexMap;

use crate::models::{ChunkStore, ScoredChunk};

/// Sort accumulated scores descending, keeping discovery order for ties.
pub fn rank_scores(scores: IndexMap<String, f64>) -> Vec<ScoredChunk> {
    let mut ranked: Vec<ScoredChunk> = scores
        .into_iter()
        .map(|(chunk_id, score)| ScoredChunk { chunk_id, score })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// One bounded slice of a ranking.
#[derive(Debug, Clone)]
pub struct Page<'a> {
    pub items: &'a [ScoredChunk],
    /// Zero-based rank of the first item in the full ranking.
    pub first_rank: usize,
}

impl<'a> Page<'a> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Chunk texts joined for an LLM prompt, least relevant first.
    ///
    /// The most relevant chunk ends up last, right before the question.
    /// Ids missing from the store are skipped.
    pub fn context(&self, store: &ChunkStore) -> String {
        self.items
            .iter()
            .rev()
            .filter_map(|item| store.get(&item.chunk_id))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Forward-only cursor over a fully sorted ranking.
#[derive(Debug)]
pub struct Pager<'s> {
    ranking: Vec<ScoredChunk>,
    store: &'s ChunkStore,
    page_size: usize,
    start: usize,
}

impl<'s> Pager<'s> {
    /// A zero `page_size` is treated as 1.
    pub fn new(ranking: Vec<ScoredChunk>, store: &'s ChunkStore, page_size: usize) -> Self {
        Self {
            ranking,
            store,
            page_size: page_size.max(1),
            start: 0,
        }
    }

    pub fn has_more(&self) -> bool {
        self.start < self.ranking.len()
    }

    pub fn total(&self) -> usize {
        self.ranking.len()
    }

    pub fn store(&self) -> &'s ChunkStore {
        self.store
    }

    pub fn ranking(&self) -> &[ScoredChunk] {
        &self.ranking
    }

    /// Return `[start, start + page_size)` and advance the cursor.
    ///
    /// Once the ranking is exhausted this returns empty pages.
    pub fn next_page(&mut self) -> Page<'_> {
        let first_rank = self.start.min(self.ranking.len());
        let end = (self.start + self.page_size).min(self.ranking.len());
        self.start += self.page_size;
        Page {
            items: &self.ranking[first_rank..end],
            first_rank,
        }
    }
}
