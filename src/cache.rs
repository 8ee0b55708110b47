//! On-disk persistence for LLM-derived indices.
//!
//! Embeddings, extracted relationships, sentiment scores, locations and
//! dimension vectors each cost one model round-trip per chunk. They are
//! kept in per-kind cache files so a restarted build only pays for chunks
//! it has not seen.
//!
//! # File layout
//!
//! ```text
//! {cache.dir}/{first 7 hex of fingerprint}-{kind suffix}
//! ```
//!
//! The fingerprint is the SHA-256 of the JSON encoding of every parameter
//! that changes the output (chunk width, model name, prompt text, ...).
//! Changing a parameter therefore selects a different file; the old one is
//! left untouched.
//!
//! The file body is a bincode-encoded envelope:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `schema_version` | bumped when an envelope or record layout changes |
//! | `kind` | which index the file holds |
//! | `fingerprint` | full hex digest, checked on load |
//! | `entries` | chunk id → record, insertion ordered |
//!
//! Writes go to a temp file in the same directory which is then renamed
//! over the target, so readers see either the old or the new file.
//!
//! # Incremental builds
//!
//! [`build_incremental`] walks the inputs in order, skips ids already in
//! the cache, computes the rest and flushes every `flush_every` computed
//! chunks, plus once at the end.

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::progress::{BuildProgressEvent, BuildProgressReporter};

/// Bumped whenever the envelope or a record type changes shape.
pub const SCHEMA_VERSION: u32 = 1;

/// Which derived index a cache file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Embeddings,
    Relationships,
    Sentiment,
    Locations,
    Attention,
}

impl IndexKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            IndexKind::Embeddings => "embeddings.bin",
            IndexKind::Relationships => "relationships.bin",
            IndexKind::Sentiment => "sentiment.bin",
            IndexKind::Locations => "locations.bin",
            IndexKind::Attention => "attention.bin",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Embeddings => "embeddings",
            IndexKind::Relationships => "relationships",
            IndexKind::Sentiment => "sentiment",
            IndexKind::Locations => "locations",
            IndexKind::Attention => "attention",
        };
        f.write_str(name)
    }
}

/// Hex SHA-256 over the JSON encoding of build parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of<T: Serialize + ?Sized>(params: &T) -> Result<Self> {
        let json = serde_json::to_vec(params).context("Failed to encode fingerprint parameters")?;
        let mut hasher = Sha256::new();
        hasher.update(&json);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven hex characters, used in file names.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    schema_version: u32,
    kind: IndexKind,
    fingerprint: &'a str,
    entries: &'a IndexMap<String, T>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    schema_version: u32,
    kind: IndexKind,
    fingerprint: String,
    entries: IndexMap<String, T>,
}

/// Outcome of reading a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Missing,
    /// The file decoded but belongs to another schema, kind or fingerprint.
    Stale,
    /// The file could not be read or decoded.
    Corrupt,
}

/// One cache file for one index kind and one fingerprint.
#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
    kind: IndexKind,
    fingerprint: Fingerprint,
}

impl IndexCache {
    pub fn new(dir: &Path, kind: IndexKind, fingerprint: Fingerprint) -> Self {
        let path = dir.join(format!("{}-{}", fingerprint.short(), kind.suffix()));
        Self {
            path,
            kind,
            fingerprint,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Read the cache. Anything other than [`LoadStatus::Loaded`] comes with
    /// an empty map; read and decode failures are logged, never returned.
    pub fn load<T: DeserializeOwned>(&self) -> (IndexMap<String, T>, LoadStatus) {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (IndexMap::new(), LoadStatus::Missing)
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cache unreadable, rebuilding");
                return (IndexMap::new(), LoadStatus::Corrupt);
            }
        };

        let envelope: Envelope<T> = match bincode::deserialize(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cache undecodable, rebuilding");
                return (IndexMap::new(), LoadStatus::Corrupt);
            }
        };

        if envelope.schema_version != SCHEMA_VERSION
            || envelope.kind != self.kind
            || envelope.fingerprint != self.fingerprint.as_str()
        {
            tracing::warn!(
                path = %self.path.display(),
                schema_version = envelope.schema_version,
                kind = %envelope.kind,
                "cache belongs to other parameters, rebuilding"
            );
            return (IndexMap::new(), LoadStatus::Stale);
        }

        tracing::debug!(path = %self.path.display(), entries = envelope.entries.len(), "cache loaded");
        (envelope.entries, LoadStatus::Loaded)
    }

    /// Atomically replace the cache file with `entries`.
    pub fn save<T: Serialize>(&self, entries: &IndexMap<String, T>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache dir: {}", dir.display()))?;

        let bytes = bincode::serialize(&EnvelopeRef {
            schema_version: SCHEMA_VERSION,
            kind: self.kind,
            fingerprint: self.fingerprint.as_str(),
            entries,
        })
        .context("Failed to encode cache")?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;
        Ok(())
    }
}

/// Counts from one incremental pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub visited: usize,
    pub computed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub flushes: usize,
}

/// Fill `cache` for every input, computing only ids it does not hold yet.
///
/// * `key` names the chunk id of an input.
/// * `compute` makes the model call; an error is logged and the input left
///   out, so the next run retries it.
/// * The visit counter advances for cached and computed inputs alike; a
///   flush happens when a computed input lands on a multiple of
///   `flush_every`. A final flush always runs.
///
/// The returned map holds the entries for `items` only, in `items` order.
/// Entries for ids no longer in the corpus stay in the file.
pub fn build_incremental<I, T, K, F>(
    cache: &IndexCache,
    items: &[I],
    key: K,
    flush_every: usize,
    progress: &dyn BuildProgressReporter,
    mut compute: F,
) -> Result<(IndexMap<String, T>, BuildSummary)>
where
    T: Serialize + DeserializeOwned,
    K: Fn(&I) -> &str,
    F: FnMut(&I) -> Result<T>,
{
    let kind = cache.kind();
    let flush_every = flush_every.max(1);
    let (mut entries, status) = cache.load::<T>();
    if status == LoadStatus::Loaded {
        progress.report(BuildProgressEvent::Resumed {
            kind,
            cached: entries.len() as u64,
        });
    }

    let mut summary = BuildSummary::default();
    let total = items.len() as u64;

    for item in items {
        let id = key(item);
        summary.visited += 1;

        if entries.contains_key(id) {
            summary.skipped += 1;
            continue;
        }

        match compute(item) {
            Ok(record) => {
                entries.insert(id.to_string(), record);
                summary.computed += 1;
                progress.report(BuildProgressEvent::Building {
                    kind,
                    n: summary.visited as u64,
                    total,
                    computed: summary.computed as u64,
                });
                if summary.visited % flush_every == 0 {
                    cache.save(&entries)?;
                    summary.flushes += 1;
                    progress.report(BuildProgressEvent::Flushed {
                        kind,
                        entries: entries.len() as u64,
                    });
                }
            }
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(%kind, chunk = id, error = %e, "skipping chunk, will retry next run");
            }
        }
    }

    cache.save(&entries)?;
    summary.flushes += 1;
    progress.report(BuildProgressEvent::Flushed {
        kind,
        entries: entries.len() as u64,
    });

    tracing::info!(
        %kind,
        visited = summary.visited,
        computed = summary.computed,
        cached = summary.skipped,
        failed = summary.failed,
        path = %cache.path().display(),
        "build pass finished"
    );

    let mut ordered = IndexMap::with_capacity(items.len());
    for item in items {
        if let Some((id, record)) = entries.swap_remove_entry(key(item)) {
            ordered.insert(id, record);
        }
    }
    Ok((ordered, summary))
}
