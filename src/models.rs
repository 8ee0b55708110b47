//! Core data models used throughout the retrieval pipeline.
//!
//! These types represent the journal entries, chunks, and scored rankings
//! that flow from the corpus loader through the indices to the session.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// A labeled unit of text, typically one journal entry. The label is the
/// file name without extension, usually a `YYYY-MM-DD` date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub label: String,
    pub content: String,
}

impl Document {
    pub fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

/// A window of a document's content.
///
/// The id is derived from the label and sequence index
/// (`{label}#{index}`) and is never set independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub label: String,
    pub index: usize,
    /// Byte offset of the window start within the document content.
    pub offset: usize,
    pub text: String,
}

impl Chunk {
    pub fn new(label: &str, index: usize, offset: usize, text: &str) -> Self {
        Self {
            id: chunk_id(label, index),
            label: label.to_string(),
            index,
            offset,
            text: text.to_string(),
        }
    }

    /// Text handed to the LLM as context: the date on the first line, then
    /// the chunk body.
    pub fn display_text(&self) -> String {
        format!("{}\n{}", self.label, self.text)
    }
}

pub fn chunk_id(label: &str, index: usize) -> String {
    format!("{}#{}", label, index)
}

/// A chunk id with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub score: f64,
}

impl ScoredChunk {
    pub fn new(chunk_id: impl Into<String>, score: f64) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            score,
        }
    }
}

/// Chunk id → display text, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    texts: IndexMap<String, String>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut store = Self::new();
        for chunk in chunks {
            store.insert(chunk);
        }
        store
    }

    pub fn insert(&mut self, chunk: &Chunk) {
        self.texts.insert(chunk.id.clone(), chunk.display_text());
    }

    pub fn get(&self, chunk_id: &str) -> Option<&str> {
        self.texts.get(chunk_id).map(String::as_str)
    }

    /// Like [`get`](Self::get), for ids that must come from this store's index.
    pub fn require(&self, chunk_id: &str) -> Result<&str, RetrievalError> {
        self.get(chunk_id)
            .ok_or_else(|| RetrievalError::UnknownChunk(chunk_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.texts.keys().map(String::as_str)
    }
}

/// A `(subject, predicate, object)` relationship. All fields are stored
/// lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Triple {
    pub fn new(subject: &str, predicate: &str, object: &str) -> Self {
        Self {
            subject: subject.to_lowercase(),
            predicate: predicate.to_lowercase(),
            object: object.to_lowercase(),
        }
    }
}
