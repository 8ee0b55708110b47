//! Contract violations raised by the retrieval core.
//!
//! Everything recoverable (malformed LLM output, missing cache files,
//! unparseable dates) is handled where it happens and never reaches this
//! type. What remains are conditions that indicate a configuration bug and
//! must stop the current query.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    /// Two vectors of different dimensionality were compared. Usually means
    /// the cache was built with a different embedding model than the query.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("unknown chunk id: {0}")]
    UnknownChunk(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_display() {
        let err = RetrievalError::DimensionMismatch {
            expected: 768,
            actual: 1536,
        };
        assert!(err.to_string().contains("768"));
        assert!(err.to_string().contains("1536"));
    }

    #[test]
    fn test_unknown_chunk_display() {
        let err = RetrievalError::UnknownChunk("2024-01-01#3".to_string());
        assert!(err.to_string().contains("2024-01-01#3"));
    }
}
