//! # journal-rag
//!
//! Local retrieval-augmented question answering over a directory of dated
//! journal entries.
//!
//! Entries are cut into overlapping chunks and indexed four ways: TF-IDF
//! over tokens, dense embeddings, (subject, predicate, object) triples
//! extracted by a language model, and per-dimension embeddings of model
//! descriptions. A question is ranked against one index, the top page of
//! chunks becomes the answer context, and `more` pages further down the
//! same ranking.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────────────┐
//! │  Corpus  │──▶│ Chunker  │──▶│ TF-IDF │ Vector │ ... │
//! │ (files)  │   │          │   └───────────┬───────────┘
//! └──────────┘   └──────────┘               │ ranking
//!                                           ▼
//!            ┌────────────┐          ┌────────────┐
//!            │   Cache    │◀────────▶│  Session   │──▶ answer
//!            │ (bincode)  │  builds  │ pager+LLM  │
//!            └────────────┘          └────────────┘
//! ```
//!
//! Model-backed indices are built one chunk at a time and flushed to a
//! fingerprinted cache file, so an interrupted build resumes where it
//! stopped.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, chunks, scores, triples |
//! | [`corpus`] | Journal directory loader |
//! | [`chunk`] | Sliding-window chunking |
//! | [`tokenize`] | Lowercasing tokenizer with stopwords |
//! | [`lexical`] | TF-IDF index |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector`] | Dense vector index |
//! | [`relationship`] | Triple extraction and matching |
//! | [`dimension`] | Multi-dimension attention index |
//! | [`ranking`] | Ranking order and pagination |
//! | [`cache`] | Fingerprinted incremental index cache |
//! | [`llm`] | Completion model abstraction |
//! | [`expand`] | Query expansion |
//! | [`session`] | Interactive chat loop |
//! | [`sentiment`] | Happiness scores and happy words |
//! | [`location`] | Location extraction and stays |
//! | [`analytic`] | Capability-driven corpus analysis |
//! | [`stats`] | Corpus statistics and phase timing |
//! | [`progress`] | Build progress reporting |
//! | [`commands`] | Subcommand runners for `jrag` |
//! | [`error`] | Retrieval contract errors |

pub mod analytic;
pub mod cache;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod dimension;
pub mod embedding;
pub mod error;
pub mod expand;
pub mod lexical;
pub mod llm;
pub mod location;
pub mod models;
pub mod progress;
pub mod ranking;
pub mod relationship;
pub mod sentiment;
pub mod session;
pub mod stats;
pub mod tokenize;
pub mod vector;
