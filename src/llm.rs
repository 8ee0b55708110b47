//! Language model completion collaborator.
//!
//! The retrieval core only needs one capability from a language model:
//! turn a prompt into text. [`CompletionModel`] is that seam; the shipped
//! implementation talks to a local Ollama server over blocking HTTP with a
//! request timeout, so a stalled model fails the call instead of hanging
//! the session forever.
//!
//! Streaming completions deliver tokens to a callback as they arrive.
//! [`ResponseFieldTracker`] follows the `"response"` string value inside a
//! streamed JSON answer so only the answer text is echoed to the terminal.
//! It is a display heuristic; the final text is always parsed in full.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::io::{BufRead, BufReader};
use std::time::Duration;

use crate::config::LlmConfig;

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub format: ResponseFormat,
    pub stream: bool,
}

impl CompletionOptions {
    pub fn text() -> Self {
        Self::default()
    }

    pub fn json() -> Self {
        Self {
            format: ResponseFormat::Json,
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Token accounting reported by the backend, when it reports any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

pub trait CompletionModel {
    /// Returns the model identifier (e.g. `"llama3.2"`).
    fn model_name(&self) -> &str;

    fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion>;

    /// Complete, handing each token to `on_token` as it arrives.
    ///
    /// Backends without streaming support deliver the whole text as one
    /// token.
    fn complete_streaming(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<Completion> {
        let completion = self.complete(prompt, options)?;
        on_token(&completion.text);
        Ok(completion)
    }
}

// ============ Ollama ============

/// Completion backend using a local Ollama instance.
///
/// Calls `POST /api/generate` on the configured URL
/// (default: `http://localhost:11434`).
pub struct OllamaClient {
    model: String,
    url: String,
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            model: config.model.clone(),
            url: config.url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn request_body(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        stream: bool,
    ) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": stream,
        });
        if options.format == ResponseFormat::Json {
            body["format"] = serde_json::Value::String("json".to_string());
        }
        body
    }

    fn send(&self, body: &serde_json::Value) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(body)
            .send()
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }
        Ok(response)
    }
}

impl CompletionModel for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<Completion> {
        if options.stream {
            return self.complete_streaming(prompt, options, &mut |_: &str| {});
        }

        let response = self.send(&self.request_body(prompt, options, false))?;
        let json: serde_json::Value = response.json().context("Invalid Ollama response")?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))?
            .to_string();

        Ok(Completion {
            text,
            usage: parse_usage(&json),
        })
    }

    fn complete_streaming(
        &self,
        prompt: &str,
        options: &CompletionOptions,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<Completion> {
        let response = self.send(&self.request_body(prompt, options, true))?;
        let mut completion = Completion::default();

        for line in BufReader::new(response).lines() {
            let line = line.context("Ollama stream interrupted")?;
            if line.trim().is_empty() {
                continue;
            }
            let part: serde_json::Value =
                serde_json::from_str(&line).context("Invalid Ollama stream line")?;
            if let Some(token) = part.get("response").and_then(|r| r.as_str()) {
                completion.text.push_str(token);
                on_token(token);
            }
            if part.get("done").and_then(|d| d.as_bool()) == Some(true) {
                completion.usage = parse_usage(&part);
                break;
            }
        }

        Ok(completion)
    }
}

fn parse_usage(json: &serde_json::Value) -> Usage {
    Usage {
        prompt_tokens: json.get("prompt_eval_count").and_then(|v| v.as_u64()),
        completion_tokens: json.get("eval_count").and_then(|v| v.as_u64()),
    }
}

/// Create the completion backend named in configuration.
pub fn create_model(config: &LlmConfig) -> Result<Box<dyn CompletionModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaClient::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Parse an LLM answer as JSON, tolerating surrounding whitespace and a
/// Markdown code fence.
pub fn parse_json_output(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))?
        .trim_end()
        .strip_suffix("```")?;
    serde_json::from_str(inner.trim()).ok()
}

// ============ Streaming display ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    SeekingKey,
    SeekingColon,
    SeekingQuote,
    InValue { escaped: bool },
    Done,
}

/// Follows the `"response"` string value of a JSON object streamed token
/// by token.
///
/// ```rust
/// use journal_rag::llm::ResponseFieldTracker;
///
/// let mut tracker = ResponseFieldTracker::new();
/// let mut shown = String::new();
/// for token in ["{\"resp", "onse\": \"Hi", " there\\n", "\", \"x\": 1}"] {
///     shown.push_str(&tracker.feed(token));
/// }
/// assert_eq!(shown, "Hi there\n");
/// assert!(tracker.is_done());
/// ```
#[derive(Debug, Clone)]
pub struct ResponseFieldTracker {
    state: TrackerState,
    window: String,
}

const RESPONSE_KEY: &str = "\"response\"";

impl Default for ResponseFieldTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseFieldTracker {
    pub fn new() -> Self {
        Self {
            state: TrackerState::SeekingKey,
            window: String::new(),
        }
    }

    /// True once the closing quote of the response value has been seen.
    pub fn is_done(&self) -> bool {
        self.state == TrackerState::Done
    }

    /// Feed one streamed token; returns the part of it that belongs to the
    /// response value, unescaped.
    pub fn feed(&mut self, token: &str) -> String {
        let mut shown = String::new();
        for c in token.chars() {
            self.state = match self.state {
                TrackerState::SeekingKey => {
                    self.window.push(c);
                    if self.window.ends_with(RESPONSE_KEY) {
                        self.window.clear();
                        TrackerState::SeekingColon
                    } else {
                        while self.window.len() > RESPONSE_KEY.len() {
                            self.window.remove(0);
                        }
                        TrackerState::SeekingKey
                    }
                }
                TrackerState::SeekingColon if c.is_whitespace() => TrackerState::SeekingColon,
                TrackerState::SeekingColon if c == ':' => TrackerState::SeekingQuote,
                TrackerState::SeekingColon => TrackerState::SeekingKey,
                TrackerState::SeekingQuote if c.is_whitespace() => TrackerState::SeekingQuote,
                TrackerState::SeekingQuote if c == '"' => TrackerState::InValue { escaped: false },
                TrackerState::SeekingQuote => TrackerState::SeekingKey,
                TrackerState::InValue { escaped: true } => {
                    shown.push(match c {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    TrackerState::InValue { escaped: false }
                }
                TrackerState::InValue { escaped: false } if c == '\\' => {
                    TrackerState::InValue { escaped: true }
                }
                TrackerState::InValue { escaped: false } if c == '"' => TrackerState::Done,
                TrackerState::InValue { escaped: false } => {
                    shown.push(c);
                    TrackerState::InValue { escaped: false }
                }
                TrackerState::Done => TrackerState::Done,
            };
        }
        shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_splits_key_across_tokens() {
        let mut tracker = ResponseFieldTracker::new();
        let mut shown = String::new();
        for token in ["{", "\"res", "ponse", "\"", " : ", "\"", "Rob's birthday", " is Dec 5", "\"", "}"] {
            shown.push_str(&tracker.feed(token));
        }
        assert_eq!(shown, "Rob's birthday is Dec 5");
        assert!(tracker.is_done());
    }

    #[test]
    fn test_tracker_handles_escaped_quotes() {
        let mut tracker = ResponseFieldTracker::new();
        let shown = tracker.feed(r#"{"response": "she said \"hi\"", "explanation": "x"}"#);
        assert_eq!(shown, "she said \"hi\"");
        assert!(tracker.is_done());
    }

    #[test]
    fn test_tracker_ignores_other_fields() {
        let mut tracker = ResponseFieldTracker::new();
        let shown = tracker.feed(r#"{"explanation": "nope", "#);
        assert!(shown.is_empty());
        assert!(!tracker.is_done());
    }

    #[test]
    fn test_parse_json_output_plain_and_fenced() {
        let plain = parse_json_output("  {\"response\": \"ok\"}\n").unwrap();
        assert_eq!(plain["response"], "ok");

        let fenced = parse_json_output("```json\n[1, 2]\n```").unwrap();
        assert_eq!(fenced, serde_json::json!([1, 2]));

        assert!(parse_json_output("Sure! Here you go").is_none());
    }

    #[test]
    fn test_options_builders() {
        let opts = CompletionOptions::json().streaming();
        assert_eq!(opts.format, ResponseFormat::Json);
        assert!(opts.stream);
        assert_eq!(CompletionOptions::text().format, ResponseFormat::Text);
    }
}
