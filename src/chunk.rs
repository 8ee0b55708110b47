//! Fixed-width sliding-window chunker.
//!
//! Splits document content into overlapping windows. Retrieval passes use
//! half-width overlap so every sentence appears whole in at least one
//! window; extraction passes (relationships, sentiment, locations) use
//! large windows with a small overlap to keep LLM calls few.
//!
//! # Algorithm
//!
//! 1. Start at offset 0.
//! 2. While `offset + width/2 < len(content)`, emit
//!    `content[offset .. offset + width]`, clipped to the content end.
//! 3. Advance by `stride`.
//!
//! Content no longer than `width/2` yields no chunks at all. Offsets are
//! byte offsets; slice bounds are snapped inward to UTF-8 character
//! boundaries, so a window never exceeds `width` bytes.
//!
//! # Example
//!
//! ```rust
//! use journal_rag::chunk::chunk_overlapping;
//!
//! let windows = chunk_overlapping("abcdefghijkl", 8);
//! assert_eq!(windows, vec![(0, "abcdefgh"), (4, "efghijkl")]);
//! ```

use serde::Serialize;

use crate::models::{Chunk, Document};

/// Width and stride of a sliding window, in bytes.
///
/// Chunk ids are positional (`{label}#{index}`), so the same id names
/// different text under a different window. Cached indices include the
/// whole window in their fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub width: usize,
    pub stride: usize,
}

impl Window {
    pub fn new(width: usize, stride: usize) -> Self {
        Self { width, stride }
    }

    /// [`chunk_corpus`] with this window.
    pub fn chunk_corpus(&self, documents: &[Document]) -> Vec<Chunk> {
        chunk_corpus(documents, self.width, self.stride)
    }
}

/// Split `content` into windows of `width` bytes, advancing by `stride`.
///
/// Returns `(start_offset, text)` pairs in order. Offsets of consecutive
/// windows differ by exactly `stride`. A zero `width` or `stride` yields
/// nothing.
pub fn chunk(content: &str, width: usize, stride: usize) -> Vec<(usize, &str)> {
    if width == 0 || stride == 0 {
        return Vec::new();
    }

    let len = content.len();
    let half = width / 2;
    let mut windows = Vec::new();
    let mut offset = 0;

    while offset + half < len {
        let start = snap_forward(content, offset);
        let end = snap_to_char_boundary(content, (offset + width).min(len)).max(start);
        windows.push((offset, &content[start..end]));
        offset += stride;
    }

    windows
}

/// Half-overlapping windows (`stride = width / 2`).
pub fn chunk_overlapping(content: &str, width: usize) -> Vec<(usize, &str)> {
    chunk(content, width, width / 2)
}

/// Large windows that overlap by only `overlap` bytes.
pub fn chunk_small_overlap(content: &str, width: usize, overlap: usize) -> Vec<(usize, &str)> {
    chunk(content, width, width.saturating_sub(overlap))
}

/// Chunk every document and assign `{label}#{index}` ids.
pub fn chunk_corpus(documents: &[Document], width: usize, stride: usize) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            chunk(&doc.content, width, stride)
                .into_iter()
                .enumerate()
                .map(|(i, (offset, text))| Chunk::new(&doc.label, i, offset, text))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Snap a byte index forward to the next valid UTF-8 char boundary.
fn snap_forward(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
