//! Corpus statistics and phase timing.
//!
//! [`CorpusStats`] summarizes what a run would index: entries, bytes,
//! retrieval chunks, extraction chunks and distinct terms. Used by
//! `jrag stats` as a quick check that the journal directory and chunking
//! settings are what you expect.
//!
//! [`PhaseTimer`] logs how long a build or query phase took relative to the
//! corpus size.

use serde::Serialize;
use std::io::Write;
use std::time::Instant;

use crate::config::Config;
use crate::lexical::TfIdfIndex;
use crate::models::Document;
use crate::tokenize::Tokenizer;

/// Times one phase and logs it against the corpus size.
pub struct PhaseTimer {
    label: &'static str,
    start: Instant,
}

impl PhaseTimer {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    /// Log elapsed time in milliseconds, plus seconds per byte and
    /// milliseconds per MB of `corpus_bytes`.
    pub fn stop_and_log(self, corpus_bytes: usize) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        let bytes = corpus_bytes.max(1) as f64;
        tracing::info!(
            phase = self.label,
            ms = format!("{:.2}", elapsed * 1000.0),
            bytes = corpus_bytes,
            secs_per_byte = format!("{:.6}", elapsed / bytes),
            ms_per_mb = format!("{:.2}", elapsed * 1000.0 / bytes * 1024.0 * 1024.0),
            "phase finished"
        );
        elapsed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub documents: usize,
    pub bytes: usize,
    pub chunks: usize,
    pub extraction_chunks: usize,
    pub terms: usize,
    pub first_label: Option<String>,
    pub last_label: Option<String>,
}

impl CorpusStats {
    pub fn compute(documents: &[Document], config: &Config, tokenizer: &Tokenizer) -> Self {
        let chunking = &config.chunking;
        let chunks = chunking.window().chunk_corpus(documents);
        let extraction = chunking.extraction_window().chunk_corpus(documents);
        let index = TfIdfIndex::build(&chunks, tokenizer, config.retrieval.tf_scheme);

        let mut labels: Vec<&str> = documents.iter().map(|d| d.label.as_str()).collect();
        labels.sort_unstable();

        Self {
            documents: documents.len(),
            bytes: corpus_bytes(documents),
            chunks: chunks.len(),
            extraction_chunks: extraction.len(),
            terms: index.term_count(),
            first_label: labels.first().map(|s| s.to_string()),
            last_label: labels.last().map(|s| s.to_string()),
        }
    }

    pub fn print(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "Journal Stats")?;
        writeln!(out, "=============")?;
        writeln!(out)?;
        writeln!(out, "  Entries:            {}", self.documents)?;
        writeln!(out, "  Size:               {}", format_bytes(self.bytes as u64))?;
        if let (Some(first), Some(last)) = (&self.first_label, &self.last_label) {
            writeln!(out, "  Range:              {} .. {}", first, last)?;
        }
        writeln!(out)?;
        writeln!(out, "  Chunks:             {}", self.chunks)?;
        writeln!(out, "  Extraction chunks:  {}", self.extraction_chunks)?;
        writeln!(out, "  Distinct terms:     {}", self.terms)?;
        writeln!(out)?;
        Ok(())
    }
}

pub fn corpus_bytes(documents: &[Document]) -> usize {
    documents.iter().map(|d| d.content.len()).sum()
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_compute() {
        let mut config = Config::default();
        config.chunking.width = 10;
        config.chunking.extraction_width = 20;
        config.chunking.extraction_overlap = 4;
        let docs = vec![
            Document::new("2024-01-02", "hiking up the ridge today"),
            Document::new("2024-01-01", "tiny"),
        ];
        let stats = CorpusStats::compute(&docs, &config, &Tokenizer::default());
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.bytes, 29);
        // 25 bytes at width 10 stride 5: offsets 0, 5, 10, 15
        assert_eq!(stats.chunks, 4);
        assert_eq!(stats.first_label.as_deref(), Some("2024-01-01"));

        let mut out = Vec::new();
        stats.print(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Entries:            2"));
    }

    #[test]
    fn test_timer_returns_elapsed() {
        let timer = PhaseTimer::start("query");
        assert!(timer.stop_and_log(0) >= 0.0);
    }
}
