//! Multi-dimension attention index.
//!
//! Instead of one embedding per chunk, the model is asked twenty short
//! questions about each chunk ("who is mentioned", "what is the tone", ...)
//! and every one-sentence answer is embedded separately. A question gets
//! the same treatment with query-side wording, and a chunk's score is the
//! sum of the per-dimension cosine similarities.
//!
//! This costs 20 completions and 20 embeddings per chunk, so records are
//! cached under [`IndexKind::Attention`] with the full prompt set in the
//! fingerprint.

use anyhow::Result;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::Path;

use crate::cache::{build_incremental, BuildSummary, Fingerprint, IndexCache, IndexKind};
use crate::chunk::Window;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::RetrievalError;
use crate::llm::{CompletionModel, CompletionOptions};
use crate::models::{Chunk, ScoredChunk};
use crate::progress::BuildProgressReporter;
use crate::ranking::rank_scores;

/// One named aspect of a text, with wording for entries and for questions.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Dimension {
    pub name: &'static str,
    pub document_prompt: &'static str,
    pub query_prompt: &'static str,
}

/// Appended to every dimension prompt.
pub const ANSWER_SUFFIX: &str = " Do not explain anything or repeat the question, just answer. The response will be put into a vector db. Keep the response to a concise sentence.";

pub const DIMENSIONS: &[Dimension] = &[
    Dimension {
        name: "Summary",
        document_prompt: "Summarize the main story or sequence of events.",
        query_prompt: "Summarize the main intent or request expressed in the text.",
    },
    Dimension {
        name: "People",
        document_prompt: "Extract all key people mentioned in the text.",
        query_prompt: "Identify any people mentioned or referred to in the text.",
    },
    Dimension {
        name: "Places",
        document_prompt: "Extract all key places mentioned in the text.",
        query_prompt: "Identify any places mentioned or referred to in the text.",
    },
    Dimension {
        name: "Organizations",
        document_prompt: "Extract all key organizations mentioned in the text.",
        query_prompt: "Identify any organizations mentioned or referred to in the text.",
    },
    Dimension {
        name: "Objects",
        document_prompt: "Extract all key objects mentioned in the text.",
        query_prompt: "Identify any objects or items mentioned or referred to in the text.",
    },
    Dimension {
        name: "Actions/Events",
        document_prompt: "Identify all key actions or events described, focusing on central activities.",
        query_prompt: "Identify the key actions or events the text is interested in or is requesting information about.",
    },
    Dimension {
        name: "Concepts/Themes",
        document_prompt: "Extract and explain key concepts, themes, or ideas that are central to the text but may not be tied to concrete entities.",
        query_prompt: "Extract and explain key concepts, themes, or ideas that are central to the text.",
    },
    Dimension {
        name: "Emotional Tone/Sentiment",
        document_prompt: "Analyze the overall emotional tone of the text and any sentiments expressed towards specific entities (people, organizations, etc.).",
        query_prompt: "Analyze the overall emotional tone or sentiment of the text, and any sentiments expressed towards specific entities.",
    },
    Dimension {
        name: "Relationships",
        document_prompt: "Identify and describe relationships between key people, places, organizations, and objects mentioned in the text.",
        query_prompt: "Identify and describe any relationships between people, places, organizations, or objects mentioned in the text.",
    },
    Dimension {
        name: "Cause-and-effect",
        document_prompt: "Extract any cause-and-effect relationships described.",
        query_prompt: "Identify any cause-and-effect relationships implied or stated in the text.",
    },
    Dimension {
        name: "Motivations",
        document_prompt: "Identify reasons or goals behind actions or feelings (motivations).",
        query_prompt: "Identify reasons or motivations behind the text.",
    },
    Dimension {
        name: "Time References",
        document_prompt: "Extract any explicit or implicit references to time (dates, seasons, periods).",
        query_prompt: "Extract any explicit or implicit references to time (dates, seasons, periods) in the text.",
    },
    Dimension {
        name: "Significant Locations",
        document_prompt: "Identify significant locations and explain their contextual importance.",
        query_prompt: "Identify any significant locations mentioned in the text and explain their relevance.",
    },
    Dimension {
        name: "Recurring Themes/Behaviors",
        document_prompt: "Analyze the text for any recurring behaviors, themes, or trends.",
        query_prompt: "Identify any recurring behaviors, themes, or trends the user is interested in based on the text.",
    },
    Dimension {
        name: "Writing Style/Structure",
        document_prompt: "Describe the writing style, tone, and notable structural elements of the text (e.g., narrative style, use of dialogue).",
        query_prompt: "Analyze the language style and tone of the text (e.g., formal, informal, urgent, inquisitive).",
    },
    Dimension {
        name: "Cultural/Historical Context",
        document_prompt: "Identify any cultural, historical, or societal contexts referenced and explain their significance to the text.",
        query_prompt: "Identify any cultural, historical, or societal contexts referenced in the text and explain their significance.",
    },
    Dimension {
        name: "Contradictions/Inconsistencies",
        document_prompt: "Identify any contradictions or inconsistencies within the text and discuss their potential impact.",
        query_prompt: "Identify any contradictions or inconsistencies within the text and discuss their potential impact on understanding the request.",
    },
    Dimension {
        name: "Intended Audience/Purpose",
        document_prompt: "Analyze the intended audience and purpose of the text, including any calls to action or persuasive elements.",
        query_prompt: "Analyze the intended purpose of the text, including any specific requests or desired outcomes.",
    },
    Dimension {
        name: "Ethical/Moral Dilemmas",
        document_prompt: "Identify any ethical or moral dilemmas presented and discuss their significance.",
        query_prompt: "Identify any ethical or moral issues raised in the text and discuss their significance.",
    },
    Dimension {
        name: "Literary Devices/Techniques",
        document_prompt: "Identify any rhetorical devices or literary techniques used (e.g., metaphors, similes, analogies) and discuss their effect.",
        query_prompt: "Identify any rhetorical devices or expressions used in the text and discuss their effect.",
    },
];

/// Which side of the comparison a text is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Document,
    Query,
}

/// Dimension name → embedded answer.
pub type DimensionVectors = IndexMap<String, Vec<f32>>;

pub fn dimension_prompt(dimension: &Dimension, side: Side, text: &str) -> String {
    let instruction = match side {
        Side::Document => dimension.document_prompt,
        Side::Query => dimension.query_prompt,
    };
    format!("{}{}\n\nText:\n{}", instruction, ANSWER_SUFFIX, text)
}

/// Ask every dimension question about `text` and embed the answers.
pub fn describe(
    text: &str,
    side: Side,
    dimensions: &[Dimension],
    model: &dyn CompletionModel,
    embedder: &dyn Embedder,
) -> Result<DimensionVectors> {
    let mut vectors = IndexMap::with_capacity(dimensions.len());
    for dimension in dimensions {
        let answer = model.complete(
            &dimension_prompt(dimension, side, text),
            &CompletionOptions::text(),
        )?;
        vectors.insert(
            dimension.name.to_string(),
            embedder.embed(answer.text.trim())?,
        );
    }
    Ok(vectors)
}

#[derive(Serialize)]
struct AttentionParams<'a> {
    window: Window,
    model: &'a str,
    embedding_model: &'a str,
    dimensions: &'a [Dimension],
    suffix: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct DimensionIndex {
    dimensions: Vec<Dimension>,
    records: IndexMap<String, DimensionVectors>,
}

impl DimensionIndex {
    pub fn from_records(dimensions: &[Dimension], records: IndexMap<String, DimensionVectors>) -> Self {
        Self {
            dimensions: dimensions.to_vec(),
            records,
        }
    }

    pub fn build(
        chunks: &[Chunk],
        window: Window,
        model: &dyn CompletionModel,
        embedder: &dyn Embedder,
        cache_dir: &Path,
        flush_every: usize,
        progress: &dyn BuildProgressReporter,
    ) -> Result<(Self, BuildSummary)> {
        let fingerprint = Fingerprint::of(&AttentionParams {
            window,
            model: model.model_name(),
            embedding_model: embedder.model_name(),
            dimensions: DIMENSIONS,
            suffix: ANSWER_SUFFIX,
        })?;
        let cache = IndexCache::new(cache_dir, IndexKind::Attention, fingerprint);
        let (records, summary) = build_incremental(
            &cache,
            chunks,
            |c| c.id.as_str(),
            flush_every,
            progress,
            |c| describe(&c.text, Side::Document, DIMENSIONS, model, embedder),
        )?;
        Ok((Self::from_records(DIMENSIONS, records), summary))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum per-dimension similarity between `query` and every chunk.
    ///
    /// Dimensions missing on either side contribute nothing.
    pub fn rank_vectors(&self, query: &DimensionVectors) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let mut scores = IndexMap::with_capacity(self.records.len());
        for (chunk_id, vectors) in &self.records {
            let mut score = 0.0f64;
            for dimension in &self.dimensions {
                if let (Some(q), Some(d)) = (query.get(dimension.name), vectors.get(dimension.name)) {
                    score += cosine_similarity(q, d)? as f64;
                }
            }
            scores.insert(chunk_id.clone(), score);
        }
        Ok(rank_scores(scores))
    }

    /// Describe `question` with the query-side prompts and rank.
    pub fn rank(
        &self,
        question: &str,
        model: &dyn CompletionModel,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredChunk>> {
        let query = describe(question, Side::Query, &self.dimensions, model, embedder)?;
        Ok(self.rank_vectors(&query)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Completion;
    use crate::progress::NoProgress;
    use std::cell::Cell;

    #[test]
    fn test_twenty_dimensions_with_unique_names() {
        assert_eq!(DIMENSIONS.len(), 20);
        let names: std::collections::HashSet<&str> = DIMENSIONS.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), 20);
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = dimension_prompt(&DIMENSIONS[1], Side::Query, "who did I meet?");
        assert!(prompt.starts_with("Identify any people mentioned"));
        assert!(prompt.contains("Keep the response to a concise sentence.\n\nText:\nwho did I meet?"));
    }

    fn vectors(pairs: &[(&str, Vec<f32>)]) -> DimensionVectors {
        pairs
            .iter()
            .map(|(name, v)| (name.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_scores_are_summed_over_dimensions() {
        let dims = &DIMENSIONS[..2];
        let mut records = IndexMap::new();
        records.insert(
            "a#0".to_string(),
            vectors(&[("Summary", vec![1.0, 0.0]), ("People", vec![1.0, 0.0])]),
        );
        records.insert(
            "b#0".to_string(),
            vectors(&[("Summary", vec![1.0, 0.0]), ("People", vec![0.0, 1.0])]),
        );
        let index = DimensionIndex::from_records(dims, records);

        let query = vectors(&[("Summary", vec![1.0, 0.0]), ("People", vec![1.0, 0.0])]);
        let ranked = index.rank_vectors(&query).unwrap();
        assert_eq!(ranked[0], ScoredChunk::new("a#0", 2.0));
        assert_eq!(ranked[1], ScoredChunk::new("b#0", 1.0));
    }

    #[test]
    fn test_dimension_mismatch_propagates() {
        let mut records = IndexMap::new();
        records.insert("a#0".to_string(), vectors(&[("Summary", vec![1.0, 0.0, 0.0])]));
        let index = DimensionIndex::from_records(&DIMENSIONS[..1], records);
        let query = vectors(&[("Summary", vec![1.0, 0.0])]);
        assert!(matches!(
            index.rank_vectors(&query),
            Err(RetrievalError::DimensionMismatch { .. })
        ));
    }

    struct EchoModel {
        calls: Cell<usize>,
    }

    impl CompletionModel for EchoModel {
        fn model_name(&self) -> &str {
            "echo"
        }

        fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<Completion> {
            self.calls.set(self.calls.get() + 1);
            Ok(Completion {
                text: format!(" {} ", prompt.len()),
                ..Default::default()
            })
        }
    }

    struct LenEmbedder;

    impl Embedder for LenEmbedder {
        fn model_name(&self) -> &str {
            "len"
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[test]
    fn test_build_asks_every_dimension_once_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![Chunk::new("2024-05-01", 0, 0, "dinner with Sam")];
        let model = EchoModel { calls: Cell::new(0) };

        let (index, _) = DimensionIndex::build(
            &chunks,
            Window::new(1024, 512),
            &model,
            &LenEmbedder,
            dir.path(),
            5,
            &NoProgress,
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(model.calls.get(), DIMENSIONS.len());

        let ranked = index.rank("who was at dinner?", &model, &LenEmbedder).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(model.calls.get(), 2 * DIMENSIONS.len());
    }
}
