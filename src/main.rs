//! # journal-rag CLI (`jrag`)
//!
//! ## Usage
//!
//! ```bash
//! jrag --config ./jrag.toml <command> [journal-dir]
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `jrag tfidf` | Chat over the TF-IDF index |
//! | `jrag vector` | Chat over chunk embeddings |
//! | `jrag graph` | Chat over extracted relationships |
//! | `jrag attention` | Chat over per-dimension embeddings |
//! | `jrag analytic` | Ask questions answered by corpus analyses |
//! | `jrag sentiment` | Happiness score per entry |
//! | `jrag happywords` | Words tied to happy and unhappy entries |
//! | `jrag locations` | Where the author was, and when |
//! | `jrag outliers` | Unusually long entries |
//! | `jrag stats` | Corpus and chunking statistics |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `journal_rag=info`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use journal_rag::commands::{self, ChatMode};
use journal_rag::config::load_config_or_default;
use journal_rag::llm::create_model;
use journal_rag::progress::ProgressMode;

/// Retrieval-augmented question answering over a journal directory.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(name = "jrag", version, about = "Ask questions about your journal")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./jrag.toml")]
    config: PathBuf,

    /// Build progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat using TF-IDF ranking.
    Tfidf { dir: Option<PathBuf> },
    /// Chat using embedding similarity.
    Vector { dir: Option<PathBuf> },
    /// Chat using extracted (subject, predicate, object) triples.
    Graph { dir: Option<PathBuf> },
    /// Chat using per-dimension embeddings of model descriptions.
    Attention { dir: Option<PathBuf> },
    /// Ask questions answered by a fixed set of corpus analyses.
    Analytic { dir: Option<PathBuf> },
    /// Score the happiness of every dated entry.
    Sentiment { dir: Option<PathBuf> },
    /// List words correlated with happy and unhappy entries.
    Happywords { dir: Option<PathBuf> },
    /// Extract locations and print stays.
    Locations { dir: Option<PathBuf> },
    /// List entries longer than their neighbours.
    Outliers { dir: Option<PathBuf> },
    /// Print corpus and chunking statistics.
    Stats { dir: Option<PathBuf> },
}

impl Commands {
    fn dir(&self) -> Option<&PathBuf> {
        match self {
            Commands::Tfidf { dir }
            | Commands::Vector { dir }
            | Commands::Graph { dir }
            | Commands::Attention { dir }
            | Commands::Analytic { dir }
            | Commands::Sentiment { dir }
            | Commands::Happywords { dir }
            | Commands::Locations { dir }
            | Commands::Outliers { dir }
            | Commands::Stats { dir } => dir.as_ref(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("journal_rag=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = load_config_or_default(&cli.config)?;
    if let Some(dir) = cli.command.dir() {
        cfg.corpus.dir = dir.clone();
    }

    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty).reporter();
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Tfidf { .. } => {
            commands::run_chat(&cfg, ChatMode::Tfidf, progress.as_ref(), &mut input, &mut out)?
        }
        Commands::Vector { .. } => {
            commands::run_chat(&cfg, ChatMode::Vector, progress.as_ref(), &mut input, &mut out)?
        }
        Commands::Graph { .. } => {
            commands::run_chat(&cfg, ChatMode::Graph, progress.as_ref(), &mut input, &mut out)?
        }
        Commands::Attention { .. } => commands::run_chat(
            &cfg,
            ChatMode::Attention,
            progress.as_ref(),
            &mut input,
            &mut out,
        )?,
        Commands::Analytic { .. } => commands::run_analytic(&cfg, &mut input, &mut out)?,
        Commands::Sentiment { .. } => {
            let model = create_model(&cfg.llm)?;
            commands::run_sentiment(&cfg, model.as_ref(), progress.as_ref(), &mut out)?;
        }
        Commands::Happywords { .. } => {
            let model = create_model(&cfg.llm)?;
            commands::run_happy_words(&cfg, model.as_ref(), progress.as_ref(), &mut out)?;
        }
        Commands::Locations { .. } => {
            let model = create_model(&cfg.llm)?;
            commands::run_locations(&cfg, model.as_ref(), progress.as_ref(), &mut out)?;
        }
        Commands::Outliers { .. } => commands::run_outliers(&cfg, &mut out)?,
        Commands::Stats { .. } => commands::run_stats(&cfg, &mut out)?,
    }

    Ok(())
}
