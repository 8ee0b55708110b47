//! Subcommand runners behind the `jrag` binary.
//!
//! Each `run_*` function loads the corpus named by the config, builds what
//! its mode needs and writes results to `out`. Interactive modes read
//! questions from `input`.

use anyhow::{bail, Result};
use indexmap::IndexMap;
use std::io::{BufRead, Write};

use crate::analytic::{self, AnalyticContext};
use crate::cache::BuildSummary;
use crate::config::Config;
use crate::corpus::load_corpus;
use crate::dimension::DimensionIndex;
use crate::embedding::{create_embedder, Embedder};
use crate::lexical::TfIdfIndex;
use crate::llm::{create_model, CompletionModel};
use crate::location;
use crate::models::{Chunk, ChunkStore, Document};
use crate::progress::BuildProgressReporter;
use crate::relationship::RelationshipIndex;
use crate::sentiment::{self, SentimentRecord};
use crate::session::{
    Command, DimensionRetriever, LexicalRetriever, RelationshipRetriever, Retriever, Session,
    VectorRetriever,
};
use crate::stats::{corpus_bytes, CorpusStats, PhaseTimer};
use crate::vector::VectorIndex;

/// Window for [`analytic::size_outliers`].
pub const OUTLIER_RADIUS: usize = 5;

/// Words listed per side by `happywords`.
pub const HAPPY_WORDS_TOP: usize = 20;

/// Which index answers questions in a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Tfidf,
    Vector,
    Graph,
    Attention,
}

/// A loaded and chunked corpus.
pub struct Corpus {
    pub documents: Vec<Document>,
    /// Retrieval chunks.
    pub chunks: Vec<Chunk>,
    /// Wider chunks for model extraction passes.
    pub extraction_chunks: Vec<Chunk>,
    pub bytes: usize,
}

impl Corpus {
    pub fn load(config: &Config) -> Result<Self> {
        let timer = PhaseTimer::start("load");
        let documents = load_corpus(&config.corpus.dir, &config.corpus.file_glob)?;
        let chunking = &config.chunking;
        let chunks = chunking.window().chunk_corpus(&documents);
        let extraction_chunks = chunking.extraction_window().chunk_corpus(&documents);
        let bytes = corpus_bytes(&documents);
        timer.stop_and_log(bytes);

        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            extraction_chunks = extraction_chunks.len(),
            "chunked corpus"
        );
        Ok(Self {
            documents,
            chunks,
            extraction_chunks,
            bytes,
        })
    }
}

fn require_embeddings(config: &Config, mode: &str) -> Result<Box<dyn Embedder>> {
    if !config.embedding.is_enabled() {
        bail!(
            "Mode '{}' requires embeddings. Set [embedding] provider in config.",
            mode
        );
    }
    create_embedder(&config.embedding)
}

/// Build the index for `mode` and chat over it.
pub fn run_chat(
    config: &Config,
    mode: ChatMode,
    progress: &dyn BuildProgressReporter,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<()> {
    let model = create_model(&config.llm)?;
    let embedder = match mode {
        ChatMode::Vector => Some(require_embeddings(config, "vector")?),
        ChatMode::Attention => Some(require_embeddings(config, "attention")?),
        ChatMode::Tfidf | ChatMode::Graph => None,
    };
    chat_with(config, mode, model.as_ref(), embedder.as_deref(), progress, input, out)
}

/// [`run_chat`] with the collaborators supplied by the caller.
pub fn chat_with(
    config: &Config,
    mode: ChatMode,
    model: &dyn CompletionModel,
    embedder: Option<&dyn Embedder>,
    progress: &dyn BuildProgressReporter,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<()> {
    let corpus = Corpus::load(config)?;
    let tokenizer = config.tokenizer();
    let expander = config.retrieval.expand_queries.then_some(model);
    let cache_dir = &config.cache.dir;
    let flush_every = config.cache.flush_every;

    let timer = PhaseTimer::start("build");
    match mode {
        ChatMode::Tfidf => {
            let index = TfIdfIndex::build(&corpus.chunks, &tokenizer, config.retrieval.tf_scheme);
            let store = ChunkStore::from_chunks(&corpus.chunks);
            timer.stop_and_log(corpus.bytes);
            let retriever = LexicalRetriever {
                index: &index,
                tokenizer: &tokenizer,
                store: &store,
                expander,
            };
            chat(&retriever, model, config, corpus.bytes, input, out)
        }
        ChatMode::Vector => {
            let Some(embedder) = embedder else {
                bail!("Mode 'vector' requires an embedder");
            };
            let (index, summary) = VectorIndex::build(
                &corpus.chunks,
                config.chunking.window(),
                embedder,
                cache_dir,
                flush_every,
                progress,
            )?;
            tracing::info!(?summary, "vector index ready");
            let store = ChunkStore::from_chunks(&corpus.chunks);
            timer.stop_and_log(corpus.bytes);
            let retriever = VectorRetriever {
                index: &index,
                embedder,
                store: &store,
                expander,
            };
            chat(&retriever, model, config, corpus.bytes, input, out)
        }
        ChatMode::Graph => {
            let (index, summary) = RelationshipIndex::build(
                &corpus.extraction_chunks,
                config.chunking.extraction_window(),
                model,
                cache_dir,
                flush_every,
                progress,
            )?;
            tracing::info!(?summary, triples = index.triple_count(), "relationship index ready");
            let store = ChunkStore::from_chunks(&corpus.extraction_chunks);
            timer.stop_and_log(corpus.bytes);
            let retriever = RelationshipRetriever {
                index: &index,
                model,
                store: &store,
            };
            chat(&retriever, model, config, corpus.bytes, input, out)
        }
        ChatMode::Attention => {
            let Some(embedder) = embedder else {
                bail!("Mode 'attention' requires an embedder");
            };
            let (index, summary) = DimensionIndex::build(
                &corpus.chunks,
                config.chunking.window(),
                model,
                embedder,
                cache_dir,
                flush_every,
                progress,
            )?;
            tracing::info!(?summary, "attention index ready");
            let store = ChunkStore::from_chunks(&corpus.chunks);
            timer.stop_and_log(corpus.bytes);
            let retriever = DimensionRetriever {
                index: &index,
                model,
                embedder,
                store: &store,
            };
            chat(&retriever, model, config, corpus.bytes, input, out)
        }
    }
}

fn chat(
    retriever: &dyn Retriever,
    model: &dyn CompletionModel,
    config: &Config,
    bytes: usize,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<()> {
    writeln!(
        out,
        "system> {} mode, ask a question ('more', 'clear', 'exit')",
        retriever.name()
    )?;
    Session::new(retriever, model, config.retrieval.page_size)
        .with_corpus_bytes(bytes)
        .run(input, out)
}

/// Answer questions through analytic capabilities.
pub fn run_analytic(config: &Config, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<()> {
    let model = create_model(&config.llm)?;
    analytic_with(config, model.as_ref(), input, out)
}

pub fn analytic_with(
    config: &Config,
    model: &dyn CompletionModel,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<()> {
    let corpus = Corpus::load(config)?;
    let tokenizer = config.tokenizer();
    let index = TfIdfIndex::build(&corpus.chunks, &tokenizer, config.retrieval.tf_scheme);
    let store = ChunkStore::from_chunks(&corpus.chunks);
    let ctx = AnalyticContext {
        index: &index,
        store: &store,
        chunks: &corpus.chunks,
        tokenizer: &tokenizer,
    };

    writeln!(out, "system> analytic mode, ask about the journal as a whole ('exit')")?;
    loop {
        write!(out, "user> ")?;
        out.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            return Ok(());
        }

        let question = match Command::parse(&line) {
            Command::Exit => return Ok(()),
            Command::Empty => continue,
            Command::More | Command::Clear => {
                writeln!(out, "system> not available in analytic mode")?;
                continue;
            }
            Command::Query(question) => question,
        };

        let timer = PhaseTimer::start("analytic");
        write!(out, "{}> ", model.model_name())?;
        let result = {
            let mut on_token = |token: &str| {
                let _ = write!(out, "{}", token);
                let _ = out.flush();
            };
            analytic::answer(&question, model, &ctx, &mut on_token)
        };
        match result {
            Ok(answer) if answer.capability.is_none() => {
                writeln!(out)?;
                writeln!(out, "system> the model did not choose a known analysis")?;
            }
            Ok(_) => writeln!(out)?,
            Err(e) => {
                writeln!(out)?;
                writeln!(out, "system> analysis failed: {}", e)?;
            }
        }
        timer.stop_and_log(corpus.bytes);
    }
}

/// Score every dated entry and print `label<TAB>score` in date order.
pub fn run_sentiment(
    config: &Config,
    model: &dyn CompletionModel,
    progress: &dyn BuildProgressReporter,
    out: &mut dyn Write,
) -> Result<()> {
    let corpus = Corpus::load(config)?;
    let (records, summary) = build_sentiment(config, &corpus, model, progress)?;
    tracing::info!(?summary, "sentiment pass finished");

    let mut rows: Vec<&SentimentRecord> = records.values().collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.label.cmp(&b.label)));
    for record in rows {
        match record.score {
            Some(score) => writeln!(out, "{}\t{}", record.label, score)?,
            None => writeln!(out, "{}\t-", record.label)?,
        }
    }
    Ok(())
}

/// Print the words most associated with happy and unhappy entries.
pub fn run_happy_words(
    config: &Config,
    model: &dyn CompletionModel,
    progress: &dyn BuildProgressReporter,
    out: &mut dyn Write,
) -> Result<()> {
    let corpus = Corpus::load(config)?;
    let (records, _) = build_sentiment(config, &corpus, model, progress)?;
    let words = sentiment::word_sentiment(
        &corpus.extraction_chunks,
        &records,
        &config.tokenizer(),
        &config.sentiment.ignore_words,
        config.sentiment.min_word_count,
        HAPPY_WORDS_TOP,
    );

    writeln!(out, "Happiest words")?;
    for (word, score) in &words.positive {
        writeln!(out, "  {:<20} {:+.3}", word, score)?;
    }
    writeln!(out)?;
    writeln!(out, "Unhappiest words")?;
    for (word, score) in &words.negative {
        writeln!(out, "  {:<20} {:+.3}", word, score)?;
    }
    Ok(())
}

fn build_sentiment(
    config: &Config,
    corpus: &Corpus,
    model: &dyn CompletionModel,
    progress: &dyn BuildProgressReporter,
) -> Result<(IndexMap<String, SentimentRecord>, BuildSummary)> {
    sentiment::build(
        &corpus.extraction_chunks,
        config.chunking.extraction_window(),
        model,
        &config.cache.dir,
        config.sentiment.flush_every,
        progress,
    )
}

/// Extract locations and print the stays they imply.
pub fn run_locations(
    config: &Config,
    model: &dyn CompletionModel,
    progress: &dyn BuildProgressReporter,
    out: &mut dyn Write,
) -> Result<()> {
    let corpus = Corpus::load(config)?;
    let (records, summary) = location::build(
        &corpus.extraction_chunks,
        config.chunking.extraction_window(),
        model,
        &config.cache.dir,
        config.cache.flush_every,
        progress,
    )?;
    tracing::info!(?summary, "location pass finished");

    let spans = location::location_spans(&records, &config.location.aliases);
    if spans.is_empty() {
        writeln!(out, "No locations found.")?;
    }
    for span in spans {
        writeln!(out, "{} .. {}  {}", span.start, span.end, span.location)?;
    }
    Ok(())
}

/// Print entries that are the longest within their neighbourhood.
pub fn run_outliers(config: &Config, out: &mut dyn Write) -> Result<()> {
    let corpus = Corpus::load(config)?;
    for outlier in analytic::size_outliers(&corpus.documents, OUTLIER_RADIUS) {
        writeln!(out, "{}\t{}", outlier.label, outlier.size)?;
    }
    Ok(())
}

pub fn run_stats(config: &Config, out: &mut dyn Write) -> Result<()> {
    let documents = load_corpus(&config.corpus.dir, &config.corpus.file_glob)?;
    CorpusStats::compute(&documents, config, &config.tokenizer()).print(out)?;
    Ok(())
}
