use httpmock::prelude::*;
use serde_json::json;

use journal_rag::config::{EmbeddingConfig, LlmConfig};
use journal_rag::embedding::{Embedder, OllamaEmbedder};
use journal_rag::llm::{CompletionModel, CompletionOptions, OllamaClient, ResponseFieldTracker};

fn llm_config(server: &MockServer) -> LlmConfig {
    LlmConfig {
        url: server.base_url(),
        timeout_secs: 5,
        ..Default::default()
    }
}

fn embedding_config(server: &MockServer) -> EmbeddingConfig {
    EmbeddingConfig {
        provider: "ollama".to_string(),
        url: Some(server.base_url()),
        timeout_secs: 5,
        max_retries: 0,
        ..Default::default()
    }
}

#[test]
fn test_ollama_completion_with_usage() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/generate");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "response": "{\"response\": \"December 5\"}",
                "done": true,
                "prompt_eval_count": 120,
                "eval_count": 9
            }));
    });

    let client = OllamaClient::new(&llm_config(&server)).unwrap();
    let completion = client
        .complete("when is Rob's birthday?", &CompletionOptions::json())
        .unwrap();

    mock.assert();
    assert_eq!(completion.text, "{\"response\": \"December 5\"}");
    assert_eq!(completion.usage.prompt_tokens, Some(120));
    assert_eq!(completion.usage.completion_tokens, Some(9));
}

#[test]
fn test_ollama_streaming_feeds_tokens() {
    let server = MockServer::start();
    let body = [
        json!({"response": "{\"response\": \"Hel", "done": false}).to_string(),
        json!({"response": "lo\"}", "done": false}).to_string(),
        json!({"response": "", "done": true, "prompt_eval_count": 40, "eval_count": 4}).to_string(),
    ]
    .join("\n");
    server.mock(|when, then| {
        when.method(POST).path("/api/generate");
        then.status(200).body(body);
    });

    let client = OllamaClient::new(&llm_config(&server)).unwrap();
    let mut tracker = ResponseFieldTracker::new();
    let mut shown = String::new();
    let completion = client
        .complete_streaming(
            "hi",
            &CompletionOptions::json().streaming(),
            &mut |token: &str| shown.push_str(&tracker.feed(token)),
        )
        .unwrap();

    assert_eq!(completion.text, "{\"response\": \"Hello\"}");
    assert_eq!(shown, "Hello");
    assert_eq!(completion.usage.prompt_tokens, Some(40));
}

#[test]
fn test_ollama_error_status_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/generate");
        then.status(404).body("model not found");
    });

    let client = OllamaClient::new(&llm_config(&server)).unwrap();
    let err = client.complete("hi", &CompletionOptions::text()).unwrap_err();
    assert!(err.to_string().contains("404"));
}

#[test]
fn test_ollama_embedder() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/embed");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"embeddings": [[0.25, -0.5, 1.0]]}));
    });

    let embedder = OllamaEmbedder::new(&embedding_config(&server)).unwrap();
    let vector = embedder.embed("2024-01-01\nwent hiking").unwrap();

    mock.assert();
    assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    assert_eq!(embedder.model_name(), "nomic-embed-text");
}

#[test]
fn test_embedder_client_error_is_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/embed");
        then.status(400).body("bad request");
    });

    let mut config = embedding_config(&server);
    config.max_retries = 3;
    let embedder = OllamaEmbedder::new(&config).unwrap();
    let err = embedder.embed("text").unwrap_err();

    mock.assert();
    assert!(err.to_string().contains("400"));
}

#[test]
fn test_embedder_missing_embeddings_is_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/embed");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"model": "nomic-embed-text"}));
    });

    let embedder = OllamaEmbedder::new(&embedding_config(&server)).unwrap();
    assert!(embedder.embed("text").is_err());
}
