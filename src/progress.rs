//! Build-pass progress reporting.
//!
//! Extraction and embedding passes make one blocking model call per chunk
//! and can run for hours on a large journal. Reporters show how far a pass
//! has come and how much of it was served from cache. Progress is emitted on
//! **stderr** so stdout stays clean for answers and batch reports.

use std::io::Write;

use crate::cache::IndexKind;

/// A single progress event for a build pass.
#[derive(Clone, Debug)]
pub enum BuildProgressEvent {
    /// A cache file was read before the pass started.
    Resumed { kind: IndexKind, cached: u64 },
    /// `n` chunks visited out of `total`; `computed` of them needed a model call.
    Building {
        kind: IndexKind,
        n: u64,
        total: u64,
        computed: u64,
    },
    /// The cache file was rewritten.
    Flushed { kind: IndexKind, entries: u64 },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "build embeddings  1,234 / 5,000 chunks (12 new)".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Resumed { kind, cached } => {
                format!("build {}  resumed with {} cached\n", kind, format_number(*cached))
            }
            BuildProgressEvent::Building {
                kind,
                n,
                total,
                computed,
            } => format!(
                "build {}  {} / {} chunks ({} new)\n",
                kind,
                format_number(*n),
                format_number(*total),
                format_number(*computed)
            ),
            BuildProgressEvent::Flushed { kind, entries } => {
                format!("build {}  saved {} entries\n", kind, format_number(*entries))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Resumed { kind, cached } => serde_json::json!({
                "event": "progress",
                "kind": kind.to_string(),
                "phase": "resumed",
                "cached": cached
            }),
            BuildProgressEvent::Building {
                kind,
                n,
                total,
                computed,
            } => serde_json::json!({
                "event": "progress",
                "kind": kind.to_string(),
                "phase": "building",
                "n": n,
                "total": total,
                "computed": computed
            }),
            BuildProgressEvent::Flushed { kind, entries } => serde_json::json!({
                "event": "progress",
                "kind": kind.to_string(),
                "phase": "flushed",
                "entries": entries
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
