//! City-level location extraction.
//!
//! Each dated extraction chunk is sent to the model with
//! [`LOCATION_PROMPT`], which asks for `{"location": ...}`. The raw answer
//! is cached under [`IndexKind::Locations`]; aliases from configuration are
//! applied when reading, so editing them never invalidates the cache.
//!
//! [`location_spans`] folds the per-chunk answers into stays: a new place
//! opens a span that lasts at least a week, and chunks with no location or
//! the same location extend the current one.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::{build_incremental, BuildSummary, Fingerprint, IndexCache, IndexKind};
use crate::chunk::Window;
use crate::llm::{parse_json_output, CompletionModel, CompletionOptions};
use crate::models::Chunk;
use crate::progress::BuildProgressReporter;
use crate::sentiment::parse_date;

pub const LOCATION_PROMPT: &str = r#"You are analysing a journal fragment.
Extract the location ONLY if the fragment clearly indicates being in some city/metropolitan area, do not include references to places.
If you're not sure, return a JSON with location none.
If you are not familar with the location, return a JSON with location none.
If the fragment is set in a street or a building or a neighborhood or something smaller than a city, return a JSON with the city of the fragment.
If the location is not specific, such as "home" or "work", return a JSON with location none.
Return ONE JSON per line.

Text:
{text}

Example Outputs:
{"location": "Cape Cod"}
{"location": "none"}
"#;

/// Minimum length of a stay.
const SPAN_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub label: String,
    pub date: NaiveDate,
    pub location: Option<String>,
}

fn is_none_marker(location: &str) -> bool {
    let trimmed = location.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none")
}

/// Read `{"location": ...}`. Bad JSON, a missing key, and `"none"` all
/// yield `None`.
pub fn parse_location(text: &str) -> Option<String> {
    let value = parse_json_output(text)?;
    let location = value.get("location")?.as_str()?;
    if is_none_marker(location) {
        return None;
    }
    Some(location.trim().to_string())
}

/// Map a raw location through `aliases` (keys lower-case).
///
/// Aliases are applied twice so an alias may point at another alias. An
/// alias resolving to `"none"` discards the location.
pub fn standardize(location: &str, aliases: &IndexMap<String, String>) -> Option<String> {
    if is_none_marker(location) {
        return None;
    }
    let mut current = location.to_string();
    for _ in 0..2 {
        if let Some(mapped) = aliases.get(&current.to_lowercase()) {
            current = mapped.clone();
        }
    }
    if is_none_marker(&current) {
        None
    } else {
        Some(current)
    }
}

pub fn extract_location(model: &dyn CompletionModel, text: &str) -> Result<Option<String>> {
    let prompt = LOCATION_PROMPT.replace("{text}", text);
    let completion = model.complete(&prompt, &CompletionOptions::json())?;
    Ok(parse_location(&completion.text))
}

#[derive(Serialize)]
struct LocationParams<'a> {
    window: Window,
    model: &'a str,
    prompt: &'a str,
}

/// Extract a location for every dated extraction chunk not yet cached.
pub fn build(
    chunks: &[Chunk],
    window: Window,
    model: &dyn CompletionModel,
    cache_dir: &Path,
    flush_every: usize,
    progress: &dyn BuildProgressReporter,
) -> Result<(IndexMap<String, LocationRecord>, BuildSummary)> {
    let dated: Vec<(&Chunk, NaiveDate)> = chunks
        .iter()
        .filter_map(|c| match parse_date(&c.label) {
            Some(date) => Some((c, date)),
            None => {
                tracing::debug!(label = %c.label, "undated entry skipped");
                None
            }
        })
        .collect();

    let fingerprint = Fingerprint::of(&LocationParams {
        window,
        model: model.model_name(),
        prompt: LOCATION_PROMPT,
    })?;
    let cache = IndexCache::new(cache_dir, IndexKind::Locations, fingerprint);
    build_incremental(
        &cache,
        &dated,
        |(c, _)| c.id.as_str(),
        flush_every,
        progress,
        |(c, date)| {
            Ok(LocationRecord {
                label: c.label.clone(),
                date: *date,
                location: extract_location(model, &c.text)?,
            })
        },
    )
}

/// A continuous stay in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSpan {
    pub location: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Fold records, in chunk id order, into stays.
///
/// Records before the first known location are ignored.
pub fn location_spans(
    records: &IndexMap<String, LocationRecord>,
    aliases: &IndexMap<String, String>,
) -> Vec<LocationSpan> {
    let mut ids: Vec<&String> = records.keys().collect();
    ids.sort();

    let mut spans: Vec<LocationSpan> = Vec::new();
    for id in ids {
        let record = &records[id];
        let location = record
            .location
            .as_deref()
            .and_then(|l| standardize(l, aliases));

        match (spans.last_mut(), location) {
            (Some(last), None) => last.end = last.end.max(record.date),
            (Some(last), Some(place)) if last.location == place => {
                last.end = last.end.max(record.date)
            }
            (_, Some(place)) => spans.push(LocationSpan {
                location: place,
                start: record.date,
                end: record.date + Duration::days(SPAN_DAYS),
            }),
            (None, None) => {}
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aliases() -> IndexMap<String, String> {
        let mut map = IndexMap::new();
        map.insert("soma".to_string(), "sf".to_string());
        map.insert("sf".to_string(), "San Francisco".to_string());
        map.insert("the bay area".to_string(), "none".to_string());
        map
    }

    #[test]
    fn test_parse_location() {
        assert_eq!(
            parse_location(r#"{"location": "Cape Cod"}"#),
            Some("Cape Cod".to_string())
        );
        assert_eq!(parse_location(r#"{"location": "none"}"#), None);
        assert_eq!(parse_location(r#"{"city": "Boston"}"#), None);
        assert_eq!(parse_location("Boston, probably"), None);
    }

    #[test]
    fn test_standardize_applies_aliases_twice() {
        let aliases = aliases();
        assert_eq!(standardize("SoMa", &aliases), Some("San Francisco".to_string()));
        assert_eq!(standardize("SF", &aliases), Some("San Francisco".to_string()));
        assert_eq!(standardize("Boston", &aliases), Some("Boston".to_string()));
        assert_eq!(standardize("The Bay Area", &aliases), None);
        assert_eq!(standardize("None", &aliases), None);
    }

    fn record(day: u32, location: Option<&str>) -> (String, LocationRecord) {
        let label = format!("2024-07-{:02}", day);
        (
            format!("{}#0", label),
            LocationRecord {
                label,
                date: NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
                location: location.map(str::to_string),
            },
        )
    }

    #[test]
    fn test_location_spans() {
        let records: IndexMap<String, LocationRecord> = [
            record(20, Some("Boston")),
            record(1, None),
            record(2, Some("sf")),
            record(12, None),
            record(15, Some("San Francisco")),
        ]
        .into_iter()
        .collect();

        let spans = location_spans(&records, &aliases());
        assert_eq!(
            spans,
            vec![
                LocationSpan {
                    location: "San Francisco".to_string(),
                    start: NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
                    end: NaiveDate::from_ymd_opt(2024, 7, 15).unwrap(),
                },
                LocationSpan {
                    location: "Boston".to_string(),
                    start: NaiveDate::from_ymd_opt(2024, 7, 20).unwrap(),
                    end: NaiveDate::from_ymd_opt(2024, 7, 27).unwrap(),
                },
            ]
        );
    }
}
