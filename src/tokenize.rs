//! Term normalization for the lexical index.
//!
//! A [`Tokenizer`] owns its stopword set; build one from configuration and
//! pass it to whatever needs to tokenize. The same instance must be used for
//! indexing and querying, otherwise query terms will not line up with
//! indexed terms.
//!
//! Steps, in order:
//!
//! 1. Split on whitespace.
//! 2. Lower-case each piece.
//! 3. Strip the punctuation class `. , ’ - ? & ; # ! : ( ) ' "`.
//! 4. Drop stopwords and empty pieces.
//!
//! ```rust
//! use journal_rag::tokenize::Tokenizer;
//!
//! let tokenizer = Tokenizer::with_stopwords(["the", "on"]);
//! assert_eq!(tokenizer.tokenize("The Cat sat, on the MAT!"), vec!["cat", "sat", "mat"]);
//! ```

use std::collections::HashSet;

/// Standard English stopwords.
pub const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

/// Filler words common in journal prose that carry no retrieval signal.
pub const JOURNAL_FILLER_WORDS: &[&str] = &[
    "got", "really", "pretty", "bit", "didnt", "get", "also", "like", "went", "go", "im",
];

const STRIPPED_PUNCTUATION: &[char] = &[
    '.', ',', '’', '-', '?', '&', ';', '#', '!', ':', '(', ')', '\'', '"',
];

#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::english(std::iter::empty::<&str>())
    }
}

impl Tokenizer {
    /// English stopwords, journal filler words, plus `extra`.
    pub fn english<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stopwords: HashSet<String> = ENGLISH_STOPWORDS
            .iter()
            .chain(JOURNAL_FILLER_WORDS)
            .map(|w| w.to_string())
            .collect();
        stopwords.extend(extra.into_iter().map(|w| w.as_ref().to_lowercase()));
        Self { stopwords }
    }

    /// Exactly the given stopwords and nothing else.
    pub fn with_stopwords<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stopwords: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn is_stopword(&self, term: &str) -> bool {
        term.is_empty() || self.stopwords.contains(term)
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|piece| {
                piece
                    .to_lowercase()
                    .chars()
                    .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
                    .collect::<String>()
            })
            .filter(|term| !self.is_stopword(term))
            .collect()
    }
}
