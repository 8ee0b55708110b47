//! Relationship index built from LLM-extracted triples.
//!
//! # Build
//!
//! Every extraction chunk is sent to the completion model with
//! [`EXTRACTION_PROMPT`]. The answer should be a JSON array of
//! `{subject, predicate, object}` objects; anything else yields an empty
//! list for that chunk. Records are cached under
//! [`IndexKind::Relationships`].
//!
//! The inverted index maps each lower-cased triple to the chunk ids it was
//! extracted from, in discovery order.
//!
//! # Query
//!
//! Triples are extracted from the question with the same prompt, then
//! matched in up to three passes. The first pass that matches anything
//! wins:
//!
//! 1. exact `(subject, predicate, object)`
//! 2. same subject and predicate
//! 3. same predicate and object
//!
//! A chunk scores one point per query triple that matched it. Passes 2 and
//! 3 scan every stored key, which is linear in the number of distinct
//! triples.

use anyhow::Result;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::{build_incremental, BuildSummary, Fingerprint, IndexCache, IndexKind};
use crate::chunk::Window;
use crate::llm::{parse_json_output, CompletionModel, CompletionOptions};
use crate::models::{Chunk, ScoredChunk, Triple};
use crate::progress::BuildProgressReporter;
use crate::ranking::rank_scores;

/// Extraction instruction. `{text}` is replaced by the chunk or question.
pub const EXTRACTION_PROMPT: &str = r#"Extract all relationships between entities mentioned in the following text. For each relationship, provide it in JSON format with keys "subject", "predicate", and "object". Include all relevant relationships you can find. Do not include any text other than the JSON array of relationships.

Text:
{text}

Example Output:
[
  {"subject": "Entity1", "predicate": "relation", "object": "Entity2"},
  {"subject": "Entity3", "predicate": "relation", "object": "Entity4"}
]
"#;

/// What was extracted from one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub date: String,
    pub chunk: String,
    pub relationships: Vec<Triple>,
}

/// Which matching pass produced a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPass {
    Exact,
    SubjectPredicate,
    PredicateObject,
}

/// Turn a model answer into triples. Never fails: malformed output is an
/// empty list, missing or null fields are empty strings.
pub fn parse_triples(text: &str) -> Vec<Triple> {
    let Some(serde_json::Value::Array(items)) = parse_json_output(text) else {
        return Vec::new();
    };

    let field = |item: &serde_json::Value, name: &str| -> String {
        item.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| {
            Triple::new(
                &field(item, "subject"),
                &field(item, "predicate"),
                &field(item, "object"),
            )
        })
        .collect()
}

/// Ask the model for the triples in `text`.
///
/// Transport failures are returned; unparseable answers are not.
pub fn extract_triples(model: &dyn CompletionModel, text: &str) -> Result<Vec<Triple>> {
    let prompt = EXTRACTION_PROMPT.replace("{text}", text);
    let completion = model.complete(&prompt, &CompletionOptions::text())?;
    let triples = parse_triples(&completion.text);
    tracing::debug!(count = triples.len(), usage = ?completion.usage, "extracted triples");
    Ok(triples)
}

#[derive(Debug, Serialize)]
struct RelationshipParams<'a> {
    window: Window,
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct RelationshipIndex {
    records: IndexMap<String, RelationshipRecord>,
    inverted: IndexMap<Triple, IndexSet<String>>,
}

impl RelationshipIndex {
    /// Index already extracted records.
    pub fn from_records(records: IndexMap<String, RelationshipRecord>) -> Self {
        let mut inverted: IndexMap<Triple, IndexSet<String>> = IndexMap::new();
        for (chunk_id, record) in &records {
            for triple in &record.relationships {
                inverted
                    .entry(triple.clone())
                    .or_default()
                    .insert(chunk_id.clone());
            }
        }
        tracing::debug!(
            chunks = records.len(),
            triples = inverted.len(),
            "built relationship index"
        );
        Self { records, inverted }
    }

    /// Extract triples for every extraction chunk not yet cached.
    pub fn build(
        chunks: &[Chunk],
        window: Window,
        model: &dyn CompletionModel,
        cache_dir: &Path,
        flush_every: usize,
        progress: &dyn BuildProgressReporter,
    ) -> Result<(Self, BuildSummary)> {
        let fingerprint = Fingerprint::of(&RelationshipParams {
            window,
            model: model.model_name(),
            prompt: EXTRACTION_PROMPT,
        })?;
        let cache = IndexCache::new(cache_dir, IndexKind::Relationships, fingerprint);
        let (records, summary) = build_incremental(
            &cache,
            chunks,
            |c| c.id.as_str(),
            flush_every,
            progress,
            |c| {
                Ok(RelationshipRecord {
                    date: c.label.clone(),
                    chunk: c.text.clone(),
                    relationships: extract_triples(model, &c.text)?,
                })
            },
        )?;
        Ok((Self::from_records(records), summary))
    }

    pub fn record(&self, chunk_id: &str) -> Option<&RelationshipRecord> {
        self.records.get(chunk_id)
    }

    pub fn triple_count(&self) -> usize {
        self.inverted.len()
    }

    /// Rank chunks for query triples. `None` when no pass matched.
    pub fn rank_triples(&self, query: &[Triple]) -> Option<(MatchPass, Vec<ScoredChunk>)> {
        let exact = self.score(query, |q| self.inverted.get(q).into_iter().collect());
        if !exact.is_empty() {
            return Some((MatchPass::Exact, rank_scores(exact)));
        }

        let subject_predicate = self.score(query, |q| {
            self.scan(|k| k.subject == q.subject && k.predicate == q.predicate)
        });
        if !subject_predicate.is_empty() {
            return Some((MatchPass::SubjectPredicate, rank_scores(subject_predicate)));
        }

        let predicate_object = self.score(query, |q| {
            self.scan(|k| k.predicate == q.predicate && k.object == q.object)
        });
        if !predicate_object.is_empty() {
            return Some((MatchPass::PredicateObject, rank_scores(predicate_object)));
        }

        None
    }

    /// Extract triples from `question` and rank against them. An empty
    /// ranking means nothing matched.
    pub fn rank(&self, question: &str, model: &dyn CompletionModel) -> Result<Vec<ScoredChunk>> {
        let query = extract_triples(model, question)?;
        Ok(match self.rank_triples(&query) {
            Some((pass, ranking)) => {
                tracing::debug!(?pass, matches = ranking.len(), "relationship match");
                ranking
            }
            None => Vec::new(),
        })
    }

    /// Posting lists of every key satisfying `matches`.
    fn scan(&self, matches: impl Fn(&Triple) -> bool) -> Vec<&IndexSet<String>> {
        self.inverted
            .iter()
            .filter(|(k, _)| matches(k))
            .map(|(_, ids)| ids)
            .collect()
    }

    /// One point per query triple for every chunk that triple matched.
    fn score<'a>(
        &'a self,
        query: &[Triple],
        postings_for: impl Fn(&Triple) -> Vec<&'a IndexSet<String>>,
    ) -> IndexMap<String, f64> {
        let mut scores: IndexMap<String, f64> = IndexMap::new();
        for q in query {
            let mut matched: IndexSet<&str> = IndexSet::new();
            for ids in postings_for(q) {
                matched.extend(ids.iter().map(String::as_str));
            }
            for chunk_id in matched {
                *scores.entry(chunk_id.to_string()).or_insert(0.0) += 1.0;
            }
        }
        scores
    }
}
