//! Corpus analytics driven by the model.
//!
//! The model never runs code. It is shown a fixed menu of
//! [`Capability`] variants and answers with one of them as JSON; the
//! capability runs against the TF-IDF index and chunk store, and its
//! result is handed back to the model to phrase an answer.
//!
//! | Capability | Result |
//! |------------|--------|
//! | `top_terms` | most frequent terms with their total frequency |
//! | `term_frequency` | total frequency and chunk count of one term |
//! | `top_chunks_for_term` | chunks where one term is most frequent |
//! | `search` | TF-IDF ranking for free text |
//! | `chunks_in_date_range` | chunks whose entry date falls in a range |
//!
//! Also home to [`size_outliers`], which needs no model at all.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::lexical::TfIdfIndex;
use crate::llm::{parse_json_output, CompletionModel, CompletionOptions};
use crate::models::{Chunk, ChunkStore, Document};
use crate::sentiment::parse_date;
use crate::tokenize::Tokenizer;

/// One analysis the model may request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum Capability {
    TopTerms {
        #[serde(default = "default_n")]
        n: usize,
    },
    TermFrequency {
        term: String,
    },
    TopChunksForTerm {
        term: String,
        #[serde(default = "default_n")]
        n: usize,
    },
    Search {
        query: String,
        #[serde(default = "default_n")]
        n: usize,
    },
    ChunksInDateRange {
        start: NaiveDate,
        end: NaiveDate,
        #[serde(default = "default_n")]
        n: usize,
    },
}

fn default_n() -> usize {
    10
}

pub const CAPABILITY_PROMPT: &str = r#"You are an assistant that answers questions about a personal journal by choosing ONE analysis to run.

Available analyses (reply with exactly one JSON object):
- {"capability": "top_terms", "n": 10}  most frequently used words in the journal
- {"capability": "term_frequency", "term": "coffee"}  how often one word is used, and in how many entries
- {"capability": "top_chunks_for_term", "term": "coffee", "n": 5}  journal passages that use a word the most
- {"capability": "search", "query": "trip to the mountains", "n": 5}  passages most relevant to free text
- {"capability": "chunks_in_date_range", "start": "2024-01-01", "end": "2024-01-31", "n": 10}  passages written between two dates

Dates are YYYY-MM-DD. Do not include any text other than the JSON object.

Question:
"""{question}"""
"#;

pub const ANSWER_PROMPT: &str = r#"You are an assistant.

Here is the result of an analysis run to answer the user's query:

{result}

Given the original question:

"""{question}"""

Please provide an answer based on the result.
"#;

/// Read the model's choice. Anything that is not a known capability is `None`.
pub fn parse_capability(text: &str) -> Option<Capability> {
    serde_json::from_value(parse_json_output(text)?).ok()
}

/// What a capability runs against.
pub struct AnalyticContext<'a> {
    pub index: &'a TfIdfIndex,
    pub store: &'a ChunkStore,
    pub chunks: &'a [Chunk],
    pub tokenizer: &'a Tokenizer,
}

impl AnalyticContext<'_> {
    /// Normalize a single term the way the index was built.
    fn term(&self, term: &str) -> String {
        self.tokenizer
            .tokenize(term)
            .into_iter()
            .next()
            .unwrap_or_else(|| term.trim().to_lowercase())
    }

    fn excerpt(&self, chunk_id: &str) -> String {
        match self.store.require(chunk_id) {
            Ok(text) => text.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "index and store disagree");
                String::new()
            }
        }
    }
}

pub fn execute(capability: &Capability, ctx: &AnalyticContext<'_>) -> serde_json::Value {
    match capability {
        Capability::TopTerms { n } => json!(ctx
            .index
            .top_terms(*n)
            .into_iter()
            .map(|(term, frequency)| json!({"term": term, "frequency": frequency}))
            .collect::<Vec<_>>()),
        Capability::TermFrequency { term } => {
            let term = ctx.term(term);
            let chunks = ctx
                .index
                .postings(&term)
                .map(|p| p.term_frequency.len())
                .unwrap_or(0);
            json!({
                "term": term,
                "total_frequency": ctx.index.total_frequency(&term),
                "chunks": chunks,
            })
        }
        Capability::TopChunksForTerm { term, n } => {
            let term = ctx.term(term);
            let mut hits: Vec<(String, f64)> = ctx
                .index
                .postings(&term)
                .map(|p| {
                    p.term_frequency
                        .iter()
                        .map(|(id, tf)| (id.clone(), *tf))
                        .collect()
                })
                .unwrap_or_default();
            hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(*n);
            json!(hits
                .into_iter()
                .map(|(id, tf)| json!({"chunk_id": id, "frequency": tf, "text": ctx.excerpt(&id)}))
                .collect::<Vec<_>>())
        }
        Capability::Search { query, n } => json!(ctx
            .index
            .rank(query, ctx.tokenizer)
            .into_iter()
            .take(*n)
            .map(|s| json!({"chunk_id": s.chunk_id, "score": s.score, "text": ctx.excerpt(&s.chunk_id)}))
            .collect::<Vec<_>>()),
        Capability::ChunksInDateRange { start, end, n } => json!(ctx
            .chunks
            .iter()
            .filter(|c| {
                parse_date(&c.label)
                    .map(|d| *start <= d && d <= *end)
                    .unwrap_or(false)
            })
            .take(*n)
            .map(|c| json!({"chunk_id": c.id, "text": c.display_text()}))
            .collect::<Vec<_>>()),
    }
}

/// Outcome of one analytic question.
#[derive(Debug, Clone)]
pub struct AnalyticAnswer {
    pub capability: Option<Capability>,
    pub result: Option<serde_json::Value>,
    pub answer: String,
}

/// Let the model pick a capability, run it, and have the model answer
/// from the result. `on_token` receives the final answer as it streams.
pub fn answer(
    question: &str,
    model: &dyn CompletionModel,
    ctx: &AnalyticContext<'_>,
    on_token: &mut dyn FnMut(&str),
) -> Result<AnalyticAnswer> {
    let choice = model.complete(
        &CAPABILITY_PROMPT.replace("{question}", question),
        &CompletionOptions::json(),
    )?;
    let Some(capability) = parse_capability(&choice.text) else {
        tracing::warn!(answer = %choice.text.trim(), "model chose no known capability");
        return Ok(AnalyticAnswer {
            capability: None,
            result: None,
            answer: String::new(),
        });
    };
    tracing::debug!(?capability, "running analytic capability");

    let result = execute(&capability, ctx);
    let rendered = serde_json::to_string_pretty(&result)?;
    let prompt = ANSWER_PROMPT
        .replace("{result}", &rendered)
        .replace("{question}", question);
    let completion = model.complete_streaming(&prompt, &CompletionOptions::text(), on_token)?;

    Ok(AnalyticAnswer {
        capability: Some(capability),
        result: Some(result),
        answer: completion.text,
    })
}

/// An entry longer than every neighbour within the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeOutlier {
    pub label: String,
    pub size: usize,
}

/// Entries whose content length is the maximum of the surrounding
/// `±radius` entries, with entries ordered by label (date).
pub fn size_outliers(documents: &[Document], radius: usize) -> Vec<SizeOutlier> {
    let mut sorted: Vec<&Document> = documents.iter().collect();
    sorted.sort_by(|a, b| a.label.cmp(&b.label));
    let sizes: Vec<usize> = sorted.iter().map(|d| d.content.len()).collect();

    let mut outliers = Vec::new();
    for (i, doc) in sorted.iter().enumerate() {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius + 1).min(sizes.len());
        let window_max = sizes[lo..hi].iter().copied().max().unwrap_or(0);
        if sizes[i] == window_max {
            outliers.push(SizeOutlier {
                label: doc.label.clone(),
                size: sizes[i],
            });
        }
    }
    outliers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexical::TfScheme;
    use crate::llm::Completion;
    use std::cell::RefCell;

    fn fixture() -> (Vec<Chunk>, Tokenizer) {
        let chunks = vec![
            Chunk::new("2024-01-05", 0, 0, "coffee with Jamie then coffee again"),
            Chunk::new("2024-02-10", 0, 0, "long run by the river"),
            Chunk::new("2024-02-11", 0, 0, "coffee and a short run"),
        ];
        (chunks, Tokenizer::with_stopwords(["with", "then", "and", "a", "by", "the"]))
    }

    #[test]
    fn test_parse_capability() {
        assert_eq!(
            parse_capability(r#"{"capability": "term_frequency", "term": "coffee"}"#),
            Some(Capability::TermFrequency {
                term: "coffee".to_string()
            })
        );
        assert_eq!(
            parse_capability(r#"{"capability": "top_terms"}"#),
            Some(Capability::TopTerms { n: 10 })
        );
        assert_eq!(
            parse_capability(
                r#"{"capability": "chunks_in_date_range", "start": "2024-02-01", "end": "2024-02-28"}"#
            ),
            Some(Capability::ChunksInDateRange {
                start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
                n: 10,
            })
        );
        assert_eq!(parse_capability(r#"{"capability": "exec", "code": "rm"}"#), None);
        assert_eq!(parse_capability("import os"), None);
    }

    #[test]
    fn test_execute_capabilities() {
        let (chunks, tokenizer) = fixture();
        let index = TfIdfIndex::build(&chunks, &tokenizer, TfScheme::Raw);
        let store = ChunkStore::from_chunks(&chunks);
        let ctx = AnalyticContext {
            index: &index,
            store: &store,
            chunks: &chunks,
            tokenizer: &tokenizer,
        };

        let top = execute(&Capability::TopTerms { n: 1 }, &ctx);
        assert_eq!(top[0]["term"], "coffee");
        assert_eq!(top[0]["frequency"], 3.0);

        let freq = execute(
            &Capability::TermFrequency {
                term: "Coffee".to_string(),
            },
            &ctx,
        );
        assert_eq!(freq["chunks"], 2);

        let best = execute(
            &Capability::TopChunksForTerm {
                term: "coffee".to_string(),
                n: 1,
            },
            &ctx,
        );
        assert_eq!(best[0]["chunk_id"], "2024-01-05#0");

        let feb = execute(
            &Capability::ChunksInDateRange {
                start: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 2, 28).unwrap(),
                n: 10,
            },
            &ctx,
        );
        assert_eq!(feb.as_array().unwrap().len(), 2);

        let search = execute(
            &Capability::Search {
                query: "river run".to_string(),
                n: 5,
            },
            &ctx,
        );
        assert_eq!(search[0]["chunk_id"], "2024-02-10#0");
    }

    struct TwoStepModel {
        prompts: RefCell<Vec<String>>,
    }

    impl CompletionModel for TwoStepModel {
        fn model_name(&self) -> &str {
            "two-step"
        }

        fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<Completion> {
            self.prompts.borrow_mut().push(prompt.to_string());
            let text = if prompt.contains("choosing ONE analysis") {
                r#"{"capability": "term_frequency", "term": "coffee"}"#
            } else {
                "You mention coffee 3 times."
            };
            Ok(Completion {
                text: text.to_string(),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_answer_runs_capability_then_asks_again() {
        let (chunks, tokenizer) = fixture();
        let index = TfIdfIndex::build(&chunks, &tokenizer, TfScheme::Raw);
        let store = ChunkStore::from_chunks(&chunks);
        let ctx = AnalyticContext {
            index: &index,
            store: &store,
            chunks: &chunks,
            tokenizer: &tokenizer,
        };
        let model = TwoStepModel {
            prompts: RefCell::new(Vec::new()),
        };

        let mut streamed = String::new();
        let result = answer("how much coffee?", &model, &ctx, &mut |t: &str| {
            streamed.push_str(t)
        })
        .unwrap();
        assert_eq!(result.answer, "You mention coffee 3 times.");
        assert_eq!(streamed, result.answer);
        assert!(model.prompts.borrow()[1].contains("\"total_frequency\": 3.0"));
    }

    #[test]
    fn test_size_outliers() {
        let sizes = [10, 50, 20, 20, 20, 20, 20, 20, 30, 20, 20, 20, 20, 20];
        let docs: Vec<Document> = sizes
            .iter()
            .enumerate()
            .map(|(i, s)| Document::new(format!("2024-01-{:02}", i + 1), "x".repeat(*s)))
            .collect();
        let labels: Vec<String> = size_outliers(&docs, 5)
            .into_iter()
            .map(|o| o.label)
            .collect();
        assert_eq!(labels, vec!["2024-01-02", "2024-01-09"]);
    }
}
