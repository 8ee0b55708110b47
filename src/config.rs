use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::Window;
use crate::lexical::TfScheme;
use crate::tokenize::Tokenizer;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub location: LocationConfig,
}

impl Config {
    /// The tokenizer shared by indexing and querying.
    pub fn tokenizer(&self) -> Tokenizer {
        Tokenizer::english(&self.tokenizer.extra_stopwords)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_file_glob")]
    pub file_glob: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: default_corpus_dir(),
            file_glob: default_file_glob(),
        }
    }
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("sample_journals")
}
fn default_file_glob() -> String {
    "[12]*".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_width")]
    pub width: usize,
    /// Defaults to `width / 2`.
    #[serde(default)]
    pub stride: Option<usize>,
    #[serde(default = "default_extraction_width")]
    pub extraction_width: usize,
    #[serde(default = "default_extraction_overlap")]
    pub extraction_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            stride: None,
            extraction_width: default_extraction_width(),
            extraction_overlap: default_extraction_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn stride(&self) -> usize {
        self.stride.unwrap_or(self.width / 2)
    }

    pub fn extraction_stride(&self) -> usize {
        self.extraction_width.saturating_sub(self.extraction_overlap)
    }

    /// Window for retrieval chunks.
    pub fn window(&self) -> Window {
        Window::new(self.width, self.stride())
    }

    /// Window for extraction chunks.
    pub fn extraction_window(&self) -> Window {
        Window::new(self.extraction_width, self.extraction_stride())
    }
}

fn default_width() -> usize {
    1024
}
fn default_extraction_width() -> usize {
    8192
}
fn default_extraction_overlap() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub tf_scheme: TfScheme,
    #[serde(default = "default_expand_queries")]
    pub expand_queries: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            tf_scheme: TfScheme::default(),
            expand_queries: default_expand_queries(),
        }
    }
}

fn default_page_size() -> usize {
    10
}
fn default_expand_queries() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TokenizerConfig {
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            url: default_ollama_url(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "ollama".to_string()
}
fn default_llm_model() -> String {
    "llama3.2".to_string()
}
fn default_ollama_url() -> String {
    OLLAMA_URL.to_string()
}
fn default_llm_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Base URL; when unset, [`EmbeddingConfig::url`] picks one for the provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn url(&self) -> &str {
        match (&self.url, self.provider.as_str()) {
            (Some(url), _) => url.as_str(),
            (None, "openai") => OPENAI_URL,
            (None, _) => OLLAMA_URL,
        }
    }
}

const OLLAMA_URL: &str = "http://localhost:11434";
const OPENAI_URL: &str = "https://api.openai.com";

fn default_embedding_provider() -> String {
    "ollama".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            flush_every: default_flush_every(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_flush_every() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct SentimentConfig {
    #[serde(default = "default_sentiment_flush_every")]
    pub flush_every: usize,
    /// Words must occur more often than this to be ranked.
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,
    #[serde(default = "default_ignore_words")]
    pub ignore_words: Vec<String>,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            flush_every: default_sentiment_flush_every(),
            min_word_count: default_min_word_count(),
            ignore_words: default_ignore_words(),
        }
    }
}

fn default_sentiment_flush_every() -> usize {
    50
}
fn default_min_word_count() -> usize {
    10
}
fn default_ignore_words() -> Vec<String> {
    [
        "good", "day", "one", "today", "back", "much", "wasnt", "even", "know", "actually",
        "would", "took", "dont", "time", "still", "place", "year", "going", "thats", "could",
        "well", "around",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationConfig {
    /// Lower-cased alias → canonical place name.
    #[serde(default = "default_aliases")]
    pub aliases: IndexMap<String, String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
        }
    }
}

fn default_aliases() -> IndexMap<String, String> {
    [
        ("sf", "San Francisco"),
        ("san francisco, ca", "San Francisco"),
        ("nyc", "New York"),
        ("new york city", "New York"),
        ("la", "Los Angeles"),
    ]
    .iter()
    .map(|(alias, place)| (alias.to_string(), place.to_string()))
    .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Like [`load_config`], but a missing file yields the built-in defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.width == 0 {
        anyhow::bail!("chunking.width must be > 0");
    }
    if config.chunking.stride() == 0 {
        anyhow::bail!("chunking.stride must be > 0");
    }
    if config.chunking.extraction_width == 0 {
        anyhow::bail!("chunking.extraction_width must be > 0");
    }
    if config.chunking.extraction_overlap >= config.chunking.extraction_width {
        anyhow::bail!("chunking.extraction_overlap must be < chunking.extraction_width");
    }

    // Validate retrieval
    if config.retrieval.page_size < 1 {
        anyhow::bail!("retrieval.page_size must be >= 1");
    }

    // Validate cache
    if config.cache.flush_every < 1 || config.sentiment.flush_every < 1 {
        anyhow::bail!("flush_every must be >= 1");
    }

    match config.llm.provider.as_str() {
        "ollama" => {}
        other => anyhow::bail!("Unknown llm provider: '{}'. Must be ollama.", other),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }

    Ok(())
}
