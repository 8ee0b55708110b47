//! Interactive question answering over a ranked index.
//!
//! A [`Session`] reads one line at a time:
//!
//! | Input | Effect |
//! |-------|--------|
//! | a question | rank chunks, answer from the first page |
//! | `more` | answer the same question from the next page |
//! | `clear` | forget the chat history |
//! | `exit`, `quit`, end of input | stop |
//!
//! Ranking is delegated to a [`Retriever`]; one exists for each index
//! (lexical, vector, relationship, dimension). Answers are requested as
//! JSON `{"response": ...}` and streamed to the output as they arrive.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::dimension::DimensionIndex;
use crate::embedding::Embedder;
use crate::error::RetrievalError;
use crate::expand::{expand_query, ExpansionStyle};
use crate::lexical::TfIdfIndex;
use crate::llm::{parse_json_output, CompletionModel, CompletionOptions, ResponseFieldTracker};
use crate::models::{ChunkStore, ScoredChunk};
use crate::ranking::Pager;
use crate::relationship::RelationshipIndex;
use crate::stats::PhaseTimer;
use crate::tokenize::Tokenizer;
use crate::vector::VectorIndex;

pub const NO_MATCHES: &str = "No matching documents found.";

pub const ANSWER_PROMPT: &str = r#"Based on the following context, answer the user's question.

Context:
{context}
{history}
Question:
{question}

Provide a clear and concise answer in JSON format with a "response" key.

Example Output:
{
  "response": "Your answer here."
}
"#;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    More,
    Clear,
    Empty,
    Query(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Command::Empty,
            "exit" | "quit" => Command::Exit,
            "more" => Command::More,
            "clear" => Command::Clear,
            _ => Command::Query(trimmed.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Questions and answers so far, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    turns: Vec<Turn>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_user(&mut self, text: &str) {
        self.turns.push(Turn {
            role: Role::User,
            text: text.to_string(),
        });
    }

    pub fn log_assistant(&mut self, text: &str) {
        self.turns.push(Turn {
            role: Role::Assistant,
            text: text.to_string(),
        });
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// `User: ...` / `Assistant: ...` lines.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .map(|turn| {
                let who = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", who, turn.text)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn build_answer_prompt(context: &str, question: &str, history: &ChatHistory) -> String {
    let history = if history.is_empty() {
        String::new()
    } else {
        format!("\nConversation so far:\n{}\n", history.render())
    };
    ANSWER_PROMPT
        .replace("{context}", context)
        .replace("{history}", &history)
        .replace("{question}", question)
}

/// How an answer came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAnswer {
    Answer(String),
    MissingResponse,
    NotJson,
}

pub fn parse_answer(text: &str) -> ParsedAnswer {
    let Some(value) = parse_json_output(text) else {
        return ParsedAnswer::NotJson;
    };
    match value.get("response") {
        Some(serde_json::Value::String(s)) => ParsedAnswer::Answer(s.clone()),
        Some(serde_json::Value::Null) | None => ParsedAnswer::MissingResponse,
        Some(other) => ParsedAnswer::Answer(other.to_string()),
    }
}

/// Ranks chunks for a question.
pub trait Retriever {
    fn name(&self) -> &str;

    /// Texts for the ids this retriever returns.
    fn store(&self) -> &ChunkStore;

    /// A [`RetrievalError`] inside the returned error is fatal to the session.
    fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>>;
}

pub struct LexicalRetriever<'a> {
    pub index: &'a TfIdfIndex,
    pub tokenizer: &'a Tokenizer,
    pub store: &'a ChunkStore,
    pub expander: Option<&'a dyn CompletionModel>,
}

impl Retriever for LexicalRetriever<'_> {
    fn name(&self) -> &str {
        "tfidf"
    }

    fn store(&self) -> &ChunkStore {
        self.store
    }

    fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let query = match self.expander {
            Some(model) => expand_query(model, question, ExpansionStyle::Keywords),
            None => question.to_string(),
        };
        Ok(self.index.rank(&query, self.tokenizer))
    }
}

pub struct VectorRetriever<'a> {
    pub index: &'a VectorIndex,
    pub embedder: &'a dyn Embedder,
    pub store: &'a ChunkStore,
    pub expander: Option<&'a dyn CompletionModel>,
}

impl Retriever for VectorRetriever<'_> {
    fn name(&self) -> &str {
        "vector"
    }

    fn store(&self) -> &ChunkStore {
        self.store
    }

    fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let query = match self.expander {
            Some(model) => expand_query(model, question, ExpansionStyle::Paraphrase),
            None => question.to_string(),
        };
        let embedded = self.embedder.embed(&query)?;
        Ok(self.index.rank(&embedded)?)
    }
}

pub struct RelationshipRetriever<'a> {
    pub index: &'a RelationshipIndex,
    pub model: &'a dyn CompletionModel,
    pub store: &'a ChunkStore,
}

impl Retriever for RelationshipRetriever<'_> {
    fn name(&self) -> &str {
        "graph"
    }

    fn store(&self) -> &ChunkStore {
        self.store
    }

    fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        self.index.rank(question, self.model)
    }
}

pub struct DimensionRetriever<'a> {
    pub index: &'a DimensionIndex,
    pub model: &'a dyn CompletionModel,
    pub embedder: &'a dyn Embedder,
    pub store: &'a ChunkStore,
}

impl Retriever for DimensionRetriever<'_> {
    fn name(&self) -> &str {
        "attention"
    }

    fn store(&self) -> &ChunkStore {
        self.store
    }

    fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        self.index.rank(question, self.model, self.embedder)
    }
}

/// A chat over one retriever.
pub struct Session<'a> {
    retriever: &'a dyn Retriever,
    model: &'a dyn CompletionModel,
    page_size: usize,
    corpus_bytes: usize,
    history: ChatHistory,
    pager: Option<Pager<'a>>,
    question: String,
}

impl<'a> Session<'a> {
    pub fn new(retriever: &'a dyn Retriever, model: &'a dyn CompletionModel, page_size: usize) -> Self {
        Self {
            retriever,
            model,
            page_size,
            corpus_bytes: 0,
            history: ChatHistory::new(),
            pager: None,
            question: String::new(),
        }
    }

    /// Corpus size used when logging query timings.
    pub fn with_corpus_bytes(mut self, corpus_bytes: usize) -> Self {
        self.corpus_bytes = corpus_bytes;
        self
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    /// Read commands until `exit`/`quit` or end of input.
    pub fn run(&mut self, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<()> {
        loop {
            write!(out, "user> ")?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                return Ok(());
            }

            if !self.handle(Command::parse(&line), out)? {
                return Ok(());
            }
        }
    }

    /// Execute one command. Returns `false` when the session should end.
    pub fn handle(&mut self, command: Command, out: &mut dyn Write) -> Result<bool> {
        match command {
            Command::Exit => return Ok(false),
            Command::Empty => {}
            Command::Clear => {
                self.history.clear();
                writeln!(out, "system> cleared chat history")?;
            }
            Command::More => {
                if self.pager.as_ref().is_some_and(|p| p.has_more()) {
                    self.answer_next_page(out)?;
                } else {
                    writeln!(out, "system> no more results")?;
                }
            }
            Command::Query(question) => self.ask(&question, out)?,
        }
        Ok(true)
    }

    fn ask(&mut self, question: &str, out: &mut dyn Write) -> Result<()> {
        let timer = PhaseTimer::start("query");
        let retriever: &'a dyn Retriever = self.retriever;

        let ranking = match retriever.retrieve(question) {
            Ok(ranking) => ranking,
            Err(e) if e.downcast_ref::<RetrievalError>().is_some() => return Err(e),
            Err(e) => {
                tracing::warn!(retriever = retriever.name(), error = %e, "retrieval failed");
                writeln!(out, "system> retrieval failed: {}", e)?;
                return Ok(());
            }
        };
        self.question = question.to_string();

        if ranking.is_empty() {
            self.pager = None;
            writeln!(out, "{}", NO_MATCHES)?;
            self.history.log_user(question);
            self.history.log_assistant("");
            return Ok(());
        }

        tracing::debug!(retriever = retriever.name(), matches = ranking.len(), "ranked");
        self.pager = Some(Pager::new(ranking, retriever.store(), self.page_size));
        self.answer_next_page(out)?;
        timer.stop_and_log(self.corpus_bytes);
        Ok(())
    }

    fn answer_next_page(&mut self, out: &mut dyn Write) -> Result<()> {
        let Some(pager) = self.pager.as_mut() else {
            return Ok(());
        };
        let total = pager.total();
        let store = pager.store();
        let page = pager.next_page();
        let first_rank = page.first_rank;
        let shown = page.len();
        let context = page.context(store);

        let prompt = build_answer_prompt(&context, &self.question, &self.history);
        writeln!(
            out,
            "system> using results {}-{} of {}",
            first_rank + 1,
            first_rank + shown,
            total
        )?;
        write!(out, "{}> ", self.model.model_name())?;

        let mut tracker = ResponseFieldTracker::new();
        let mut streamed = false;
        let completion = {
            let mut on_token = |token: &str| {
                let visible = tracker.feed(token);
                if !visible.is_empty() {
                    streamed = true;
                    let _ = write!(out, "{}", visible);
                    let _ = out.flush();
                }
            };
            self.model.complete_streaming(
                &prompt,
                &CompletionOptions::json().streaming(),
                &mut on_token,
            )?
        };

        let answer = match parse_answer(&completion.text) {
            ParsedAnswer::Answer(answer) => {
                if !streamed {
                    write!(out, "{}", answer)?;
                }
                writeln!(out)?;
                answer
            }
            ParsedAnswer::MissingResponse => {
                writeln!(out)?;
                writeln!(out, "system> no 'response' field in the output")?;
                String::new()
            }
            ParsedAnswer::NotJson => {
                writeln!(out)?;
                writeln!(out, "system> failed to parse the answer as JSON")?;
                String::new()
            }
        };

        if let Some(prompt_tokens) = completion.usage.prompt_tokens {
            tracing::info!(
                prompt_tokens,
                completion_tokens = ?completion.usage.completion_tokens,
                tokens_per_chunk = format!("{:.2}", prompt_tokens as f64 / shown.max(1) as f64),
                "answer usage"
            );
        }

        if first_rank == 0 {
            self.history.log_user(&self.question);
        }
        self.history.log_assistant(&answer);
        Ok(())
    }
}
