//! TF-IDF lexical index.
//!
//! # Build
//!
//! For every chunk, tokenize and count. Each occurrence adds `1/document_len`
//! to the term's posting for that chunk ([`TfScheme::Normalized`], the
//! default) or `1` ([`TfScheme::Raw`]). Once all chunks are in, every term
//! gets
//!
//! ```text
//! idf = ln(chunk_count) - ln(chunks containing term)
//! ```
//!
//! # Query
//!
//! For each query term present in the index, every chunk in its posting
//! list accumulates `tf × idf`. Terms missing from the index contribute
//! nothing. The result is ranked by [`rank_scores`], so ties stay in
//! discovery order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::models::{Chunk, ScoredChunk};
use crate::ranking::rank_scores;
use crate::tokenize::Tokenizer;

/// How term frequency is counted per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TfScheme {
    /// Occurrences divided by the chunk's token count.
    #[default]
    Normalized,
    /// Plain occurrence count.
    Raw,
}

/// Per-term postings plus the term's inverse document frequency.
#[derive(Debug, Clone, Default)]
pub struct Posting {
    pub term_frequency: IndexMap<String, f64>,
    pub inverse_document_frequency: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    postings: IndexMap<String, Posting>,
    chunk_count: usize,
    scheme: TfScheme,
}

impl TfIdfIndex {
    pub fn build(chunks: &[Chunk], tokenizer: &Tokenizer, scheme: TfScheme) -> Self {
        let mut postings: IndexMap<String, Posting> = IndexMap::new();

        for chunk in chunks {
            let tokens = tokenizer.tokenize(&chunk.text);
            let document_len = tokens.len();
            let increment = match scheme {
                TfScheme::Normalized => 1.0 / document_len.max(1) as f64,
                TfScheme::Raw => 1.0,
            };
            for token in tokens {
                *postings
                    .entry(token)
                    .or_default()
                    .term_frequency
                    .entry(chunk.id.clone())
                    .or_insert(0.0) += increment;
            }
        }

        let chunk_count = chunks.len();
        let log_chunk_count = (chunk_count as f64).ln();
        for posting in postings.values_mut() {
            posting.inverse_document_frequency =
                log_chunk_count - (posting.term_frequency.len() as f64).ln();
        }

        tracing::debug!(
            chunks = chunk_count,
            terms = postings.len(),
            ?scheme,
            "built tf-idf index"
        );

        Self {
            postings,
            chunk_count,
            scheme,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn scheme(&self) -> TfScheme {
        self.scheme
    }

    pub fn postings(&self, term: &str) -> Option<&Posting> {
        self.postings.get(term)
    }

    pub fn idf(&self, term: &str) -> Option<f64> {
        self.postings.get(term).map(|p| p.inverse_document_frequency)
    }

    pub fn term_frequency(&self, term: &str, chunk_id: &str) -> f64 {
        self.postings
            .get(term)
            .and_then(|p| p.term_frequency.get(chunk_id))
            .copied()
            .unwrap_or(0.0)
    }

    /// Sum of a term's frequency across all chunks.
    pub fn total_frequency(&self, term: &str) -> f64 {
        self.postings
            .get(term)
            .map(|p| p.term_frequency.values().sum())
            .unwrap_or(0.0)
    }

    /// Terms with the highest total frequency, descending.
    pub fn top_terms(&self, n: usize) -> Vec<(String, f64)> {
        let mut totals: Vec<(String, f64)> = self
            .postings
            .iter()
            .map(|(term, p)| (term.clone(), p.term_frequency.values().sum()))
            .collect();
        totals.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        totals.truncate(n);
        totals
    }

    /// Rank chunks against already tokenized query terms.
    pub fn rank_terms<S: AsRef<str>>(&self, terms: &[S]) -> Vec<ScoredChunk> {
        let mut combined: IndexMap<String, f64> = IndexMap::new();

        for term in terms {
            let Some(posting) = self.postings.get(term.as_ref()) else {
                continue;
            };
            let idf = posting.inverse_document_frequency;
            for (chunk_id, tf) in &posting.term_frequency {
                *combined.entry(chunk_id.clone()).or_insert(0.0) += tf * idf;
            }
        }

        rank_scores(combined)
    }

    /// Tokenize `query` and rank chunks against it.
    pub fn rank(&self, query: &str, tokenizer: &Tokenizer) -> Vec<ScoredChunk> {
        let terms = tokenizer.tokenize(query);
        tracing::debug!(?terms, "tf-idf query terms");
        self.rank_terms(&terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_tokenizer() -> Tokenizer {
        Tokenizer::with_stopwords(["the", "a", "and"])
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new("2024-01-01", i, 0, t))
            .collect()
    }

    #[test]
    fn test_idf_formula() {
        let mut texts = vec!["filler words only"; 10];
        texts[3] = "climbing gym";
        texts[7] = "climbing outdoors";
        let index = TfIdfIndex::build(&chunks(&texts), &plain_tokenizer(), TfScheme::Normalized);

        let idf = index.idf("climbing").unwrap();
        assert!((idf - (10f64.ln() - 2f64.ln())).abs() < 1e-12);
        assert!((idf - 1.609).abs() < 1e-3);
        assert_eq!(index.chunk_count(), 10);
    }

    #[test]
    fn test_normalized_term_frequency() {
        let index = TfIdfIndex::build(
            &chunks(&["coffee coffee tea and the cake"]),
            &plain_tokenizer(),
            TfScheme::Normalized,
        );
        assert!((index.term_frequency("coffee", "2024-01-01#0") - 0.5).abs() < 1e-12);
        assert!((index.term_frequency("tea", "2024-01-01#0") - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_raw_term_frequency() {
        let index = TfIdfIndex::build(
            &chunks(&["coffee coffee tea"]),
            &plain_tokenizer(),
            TfScheme::Raw,
        );
        assert_eq!(index.term_frequency("coffee", "2024-01-01#0"), 2.0);
        assert_eq!(index.scheme(), TfScheme::Raw);
    }

    #[test]
    fn test_rank_orders_by_tf_idf() {
        let index = TfIdfIndex::build(
            &chunks(&[
                "hiking trail mountain",
                "hiking hiking hiking",
                "cooking dinner",
                "mountain view",
            ]),
            &plain_tokenizer(),
            TfScheme::Normalized,
        );
        let ranked = index.rank("hiking", &plain_tokenizer());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk_id, "2024-01-01#1");
        assert_eq!(ranked[1].chunk_id, "2024-01-01#0");
    }

    #[test]
    fn test_rank_is_deterministic_with_ties() {
        let index = TfIdfIndex::build(
            &chunks(&["swim", "swim", "run", "swim"]),
            &plain_tokenizer(),
            TfScheme::Normalized,
        );
        let first = index.rank("swim", &plain_tokenizer());
        let second = index.rank("swim", &plain_tokenizer());
        assert_eq!(first, second);
        let ids: Vec<&str> = first.iter().map(|s| s.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["2024-01-01#0", "2024-01-01#1", "2024-01-01#3"]);
    }

    #[test]
    fn test_rank_empty_and_unknown_terms() {
        let index = TfIdfIndex::build(&chunks(&["bread"]), &plain_tokenizer(), TfScheme::Normalized);
        assert!(index.rank("", &plain_tokenizer()).is_empty());
        assert!(index.rank("the and a", &plain_tokenizer()).is_empty());
        assert!(index.rank("pizza", &plain_tokenizer()).is_empty());
    }

    #[test]
    fn test_top_terms() {
        let index = TfIdfIndex::build(
            &chunks(&["dog dog cat", "dog bird"]),
            &plain_tokenizer(),
            TfScheme::Raw,
        );
        let top = index.top_terms(2);
        assert_eq!(top[0], ("dog".to_string(), 3.0));
        assert_eq!(index.total_frequency("bird"), 1.0);
        assert_eq!(index.term_count(), 3);
    }
}
