//! Happiness scoring per entry, and the words that track it.
//!
//! The sentiment pass asks the model for a 1–100 happiness rating of every
//! extraction chunk and caches the answers under [`IndexKind::Sentiment`].
//! Entries whose label is not a date are skipped: a score without a date
//! cannot be placed on a timeline.
//!
//! [`word_sentiment`] then correlates vocabulary with those scores: each
//! token occurrence contributes `(score - 50) / 50` (unscored chunks count
//! as neutral) and words are ranked by their average.

use anyhow::Result;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::cache::{build_incremental, BuildSummary, Fingerprint, IndexCache, IndexKind};
use crate::chunk::Window;
use crate::llm::{CompletionModel, CompletionOptions};
use crate::models::Chunk;
use crate::progress::BuildProgressReporter;
use crate::tokenize::Tokenizer;

pub const SENTIMENT_PROMPT: &str = "Please analyze the following text and provide a rating of the happiness of the author on a scale of 1 to 100. Just provide the numerical rating.

Text:
{text}

";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y_%m_%d", "%Y.%m.%d", "%Y/%m/%d", "%Y%m%d"];

/// Parse an entry label as a calendar date.
///
/// Accepts the common separators, and a date followed by a suffix
/// (`2024-03-01-evening`).
pub fn parse_date(label: &str) -> Option<NaiveDate> {
    let label = label.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(label, format) {
            return Some(date);
        }
    }
    let prefix = label.get(..10)?;
    DATE_FORMATS[..4]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(prefix, format).ok())
}

/// The model's answer as an integer, or `None`.
pub fn parse_score(text: &str) -> Option<i32> {
    text.trim().parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub label: String,
    pub date: NaiveDate,
    pub score: Option<i32>,
}

impl SentimentRecord {
    /// Score mapped to `[-1, 1]`; unscored is neutral.
    pub fn normalized(&self) -> f64 {
        self.score
            .map(|s| (s as f64 - 50.0) / 50.0)
            .unwrap_or(0.0)
    }
}

pub fn score_chunk(model: &dyn CompletionModel, text: &str) -> Result<Option<i32>> {
    let prompt = SENTIMENT_PROMPT.replace("{text}", text);
    let completion = model.complete(&prompt, &CompletionOptions::text())?;
    let score = parse_score(&completion.text);
    if score.is_none() {
        tracing::warn!(answer = %completion.text.trim(), "unparseable sentiment score");
    }
    Ok(score)
}

#[derive(Serialize)]
struct SentimentParams<'a> {
    window: Window,
    model: &'a str,
    prompt: &'a str,
}

/// Score every dated extraction chunk not yet cached.
pub fn build(
    chunks: &[Chunk],
    window: Window,
    model: &dyn CompletionModel,
    cache_dir: &Path,
    flush_every: usize,
    progress: &dyn BuildProgressReporter,
) -> Result<(IndexMap<String, SentimentRecord>, BuildSummary)> {
    let mut dated: Vec<(&Chunk, NaiveDate)> = Vec::with_capacity(chunks.len());
    let mut undated: HashSet<&str> = HashSet::new();
    for chunk in chunks {
        match parse_date(&chunk.label) {
            Some(date) => dated.push((chunk, date)),
            None => {
                if undated.insert(chunk.label.as_str()) {
                    tracing::warn!(label = %chunk.label, "could not parse date, skipping entry");
                }
            }
        }
    }

    let fingerprint = Fingerprint::of(&SentimentParams {
        window,
        model: model.model_name(),
        prompt: SENTIMENT_PROMPT,
    })?;
    let cache = IndexCache::new(cache_dir, IndexKind::Sentiment, fingerprint);
    build_incremental(
        &cache,
        &dated,
        |(c, _)| c.id.as_str(),
        flush_every,
        progress,
        |(c, date)| {
            Ok(SentimentRecord {
                label: c.label.clone(),
                date: *date,
                score: score_chunk(model, &c.text)?,
            })
        },
    )
}

/// Words ranked by average normalized sentiment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordSentiment {
    /// Happiest first.
    pub positive: Vec<(String, f64)>,
    /// Unhappiest first.
    pub negative: Vec<(String, f64)>,
}

/// Correlate tokens with chunk scores.
///
/// Only chunks with a record take part. Words in `ignore` and words seen
/// `min_count` times or fewer are dropped. Each list keeps at most `top`
/// words.
pub fn word_sentiment(
    chunks: &[Chunk],
    records: &IndexMap<String, SentimentRecord>,
    tokenizer: &Tokenizer,
    ignore: &[String],
    min_count: usize,
    top: usize,
) -> WordSentiment {
    let mut sums: IndexMap<String, (f64, usize)> = IndexMap::new();
    for chunk in chunks {
        let Some(record) = records.get(&chunk.id) else {
            continue;
        };
        let normalized = record.normalized();
        for token in tokenizer.tokenize(&chunk.text) {
            let entry = sums.entry(token).or_insert((0.0, 0));
            entry.0 += normalized;
            entry.1 += 1;
        }
    }

    let averages: Vec<(String, f64)> = sums
        .into_iter()
        .filter(|(word, (_, count))| *count > min_count && !ignore.contains(word))
        .map(|(word, (sum, count))| (word, sum / count as f64))
        .collect();

    let mut positive = averages.clone();
    positive.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    positive.truncate(top);

    let mut negative = averages;
    negative.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    negative.truncate(top);

    WordSentiment { positive, negative }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Completion;
    use crate::progress::NoProgress;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert_eq!(parse_date("2024-03-01"), expected);
        assert_eq!(parse_date("2024_03_01"), expected);
        assert_eq!(parse_date("20240301"), expected);
        assert_eq!(parse_date("2024-03-01-evening"), expected);
        assert_eq!(parse_date("1st draft"), None);
        assert_eq!(parse_date("2024-13-01"), None);
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(" 72\n"), Some(72));
        assert_eq!(parse_score("Rating: 72"), None);
        assert_eq!(parse_score(""), None);
    }

    #[test]
    fn test_normalized() {
        let record = |score| SentimentRecord {
            label: "2024-01-01".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            score,
        };
        assert_eq!(record(Some(100)).normalized(), 1.0);
        assert_eq!(record(Some(25)).normalized(), -0.5);
        assert_eq!(record(None).normalized(), 0.0);
    }

    struct FixedModel;

    impl CompletionModel for FixedModel {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<Completion> {
            let text = if prompt.contains("beach") { "90" } else { "meh" };
            Ok(Completion {
                text: text.to_string(),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_build_skips_undated_entries() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![
            Chunk::new("2024-06-01", 0, 0, "beach all afternoon"),
            Chunk::new("2024-06-02", 0, 0, "taxes"),
            Chunk::new("1-notes", 0, 0, "beach list"),
        ];
        let window = Window::new(8192, 7936);
        let (records, summary) =
            build(&chunks, window, &FixedModel, dir.path(), 50, &NoProgress).unwrap();
        assert_eq!(summary.visited, 2);
        assert_eq!(records["2024-06-01#0"].score, Some(90));
        assert_eq!(records["2024-06-02#0"].score, None);
        assert!(!records.contains_key("1-notes#0"));
    }

    #[test]
    fn test_overlap_change_rescores_entries() {
        let dir = tempfile::tempdir().unwrap();
        let chunks = vec![
            Chunk::new("2024-06-01", 0, 0, "beach all afternoon"),
            Chunk::new("2024-06-02", 0, 0, "taxes"),
        ];
        let (_, first) =
            build(&chunks, Window::new(40, 32), &FixedModel, dir.path(), 50, &NoProgress).unwrap();
        assert_eq!(first.computed, 2);

        let (_, again) =
            build(&chunks, Window::new(40, 32), &FixedModel, dir.path(), 50, &NoProgress).unwrap();
        assert_eq!(again.skipped, 2);

        let (records, other) =
            build(&chunks, Window::new(40, 20), &FixedModel, dir.path(), 50, &NoProgress).unwrap();
        assert_eq!(other.skipped, 0);
        assert_eq!(other.computed, 2);
        assert_eq!(records["2024-06-01#0"].score, Some(90));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_word_sentiment_ranks_and_filters() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut chunks = Vec::new();
        let mut records = IndexMap::new();
        for i in 0..4 {
            let (text, score) = if i % 2 == 0 {
                ("surf surf friends day", Some(100))
            } else {
                ("deadline friends day", Some(0))
            };
            let chunk = Chunk::new(&format!("2024-01-0{}", i + 1), 0, 0, text);
            records.insert(
                chunk.id.clone(),
                SentimentRecord {
                    label: chunk.label.clone(),
                    date,
                    score,
                },
            );
            chunks.push(chunk);
        }
        let tokenizer = Tokenizer::with_stopwords(Vec::<String>::new());
        let ignore = vec!["day".to_string()];
        let ranked = word_sentiment(&chunks, &records, &tokenizer, &ignore, 1, 40);

        assert_eq!(ranked.positive[0], ("surf".to_string(), 1.0));
        assert_eq!(ranked.negative[0], ("deadline".to_string(), -1.0));
        assert!(ranked.positive.iter().any(|(w, s)| w == "friends" && *s == 0.0));
        assert!(ranked.positive.iter().all(|(w, _)| w != "day"));
    }
}
