use anyhow::{bail, Result};
use std::cell::{Cell, RefCell};
use std::io::Cursor;

use journal_rag::chunk::Window;
use journal_rag::embedding::Embedder;
use journal_rag::error::RetrievalError;
use journal_rag::llm::{Completion, CompletionModel, CompletionOptions};
use journal_rag::models::{Chunk, ChunkStore};
use journal_rag::progress::NoProgress;
use journal_rag::relationship::RelationshipIndex;
use journal_rag::session::{RelationshipRetriever, Session, VectorRetriever, NO_MATCHES};
use journal_rag::vector::VectorIndex;

/// Answers every prompt from a fixed rule set and remembers the prompts.
struct ScriptedModel {
    prompts: RefCell<Vec<String>>,
}

impl ScriptedModel {
    fn new() -> Self {
        Self {
            prompts: RefCell::new(Vec::new()),
        }
    }

    fn answer_prompts(&self) -> Vec<String> {
        self.prompts
            .borrow()
            .iter()
            .filter(|p| p.starts_with("Based on the following context"))
            .cloned()
            .collect()
    }
}

impl CompletionModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<Completion> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let answers = self.answer_prompts().len();
        let text = if prompt.starts_with("Based on the following context") {
            format!(r#"{{"response": "answer {}"}}"#, answers)
        } else if prompt.contains("when is rob's birthday") || prompt.contains("December") {
            r#"[{"subject": "Rob", "predicate": "has birthday", "object": "December 5"}]"#.to_string()
        } else if prompt.contains("June") {
            r#"[{"subject": "Rob", "predicate": "has birthday", "object": "June"}]"#.to_string()
        } else {
            "[]".to_string()
        };
        Ok(Completion {
            text,
            ..Default::default()
        })
    }
}

/// Always embeds to the same vector.
struct FixedEmbedder(Vec<f32>);

impl Embedder for FixedEmbedder {
    fn model_name(&self) -> &str {
        "fixed"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// Embeds by text length; fails once `budget` calls are spent.
struct LengthEmbedder {
    budget: Option<usize>,
    calls: Cell<usize>,
}

impl LengthEmbedder {
    fn new(budget: Option<usize>) -> Self {
        Self {
            budget,
            calls: Cell::new(0),
        }
    }
}

impl Embedder for LengthEmbedder {
    fn model_name(&self) -> &str {
        "length"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        if self.budget.is_some_and(|b| n >= b) {
            bail!("connection reset");
        }
        Ok(vec![text.len() as f32, 1.0])
    }
}

fn dated_chunks(n: usize) -> Vec<Chunk> {
    (0..n)
        .map(|i| Chunk::new(&format!("2024-01-{:02}", i + 1), 0, 0, &format!("entry {}", i)))
        .collect()
}

fn run(session: &mut Session<'_>, script: &str) -> (Result<()>, String) {
    let mut input = Cursor::new(script.to_string());
    let mut out = Vec::new();
    let result = session.run(&mut input, &mut out);
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn test_more_pages_through_the_ranking() {
    let chunks = dated_chunks(23);
    let index = VectorIndex::from_vectors(
        chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), vec![1.0, i as f32 * 0.1]))
            .collect(),
    );
    let store = ChunkStore::from_chunks(&chunks);
    let embedder = FixedEmbedder(vec![1.0, 0.0]);
    let model = ScriptedModel::new();
    let retriever = VectorRetriever {
        index: &index,
        embedder: &embedder,
        store: &store,
        expander: None,
    };

    let mut session = Session::new(&retriever, &model, 10);
    let (result, out) = run(&mut session, "what happened?\nmore\nmore\nmore\nexit\n");
    result.unwrap();

    assert!(out.contains("using results 1-10 of 23"));
    assert!(out.contains("using results 11-20 of 23"));
    assert!(out.contains("using results 21-23 of 23"));
    assert!(out.contains("system> no more results"));
    assert!(out.contains("answer 1"));

    let prompts = model.answer_prompts();
    assert_eq!(prompts.len(), 3);
    // most relevant chunk sits right before the question
    assert!(prompts[0].contains("2024-01-01\nentry 0\n\nQuestion:\nwhat happened?"));
    assert!(prompts[1].contains("User: what happened?\nAssistant: answer 1"));
    assert!(prompts[2].contains("2024-01-21\nentry 20"));
}

#[test]
fn test_clear_forgets_history() {
    let chunks = dated_chunks(2);
    let index = VectorIndex::from_vectors(
        chunks.iter().map(|c| (c.id.clone(), vec![1.0, 0.0])).collect(),
    );
    let store = ChunkStore::from_chunks(&chunks);
    let embedder = FixedEmbedder(vec![1.0, 0.0]);
    let model = ScriptedModel::new();
    let retriever = VectorRetriever {
        index: &index,
        embedder: &embedder,
        store: &store,
        expander: None,
    };

    let mut session = Session::new(&retriever, &model, 10);
    let (result, out) = run(&mut session, "first?\nclear\nsecond?\n");
    result.unwrap();
    assert!(out.contains("system> cleared chat history"));

    let prompts = model.answer_prompts();
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[1].contains("first?"));
    assert_eq!(session.history().turns().len(), 2);
}

#[test]
fn test_dimension_mismatch_ends_the_session() {
    let chunks = dated_chunks(3);
    let index = VectorIndex::from_vectors(
        chunks.iter().map(|c| (c.id.clone(), vec![1.0, 0.0])).collect(),
    );
    let store = ChunkStore::from_chunks(&chunks);
    let embedder = FixedEmbedder(vec![1.0, 0.0, 0.0]);
    let model = ScriptedModel::new();
    let retriever = VectorRetriever {
        index: &index,
        embedder: &embedder,
        store: &store,
        expander: None,
    };

    let mut session = Session::new(&retriever, &model, 10);
    let (result, _) = run(&mut session, "anything?\nexit\n");
    let err = result.unwrap_err();
    assert_eq!(
        err.downcast_ref::<RetrievalError>(),
        Some(&RetrievalError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    );
    assert!(model.answer_prompts().is_empty());
}

#[test]
fn test_graph_session_prefers_exact_triples() {
    let dir = tempfile::tempdir().unwrap();
    let chunks = vec![
        Chunk::new("2024-05-01", 0, 0, "Rob's birthday is in June, or so he says."),
        Chunk::new("2024-12-05", 0, 0, "Dinner for Rob, his birthday is December 5."),
    ];
    let model = ScriptedModel::new();
    let (index, summary) = RelationshipIndex::build(
        &chunks,
        Window::new(8192, 7936),
        &model,
        dir.path(),
        5,
        &NoProgress,
    )
    .unwrap();
    assert_eq!(summary.computed, 2);

    let store = ChunkStore::from_chunks(&chunks);
    let retriever = RelationshipRetriever {
        index: &index,
        model: &model,
        store: &store,
    };
    let mut session = Session::new(&retriever, &model, 10);
    let (result, out) = run(&mut session, "when is rob's birthday?\nwhere is the cat?\n");
    result.unwrap();

    assert!(out.contains("using results 1-1 of 1"));
    let prompts = model.answer_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("December 5."));
    assert!(!prompts[0].contains("June"));
    assert!(out.contains(NO_MATCHES));
}

#[test]
fn test_interrupted_build_resumes_to_the_same_index() {
    let chunks: Vec<Chunk> = (0..12)
        .map(|i| Chunk::new("2024-02-01", i, i * 8, &"x".repeat(i + 1)))
        .collect();

    let fresh_dir = tempfile::tempdir().unwrap();
    let fresh_embedder = LengthEmbedder::new(None);
    let (fresh, _) = VectorIndex::build(
        &chunks,
        Window::new(16, 8),
        &fresh_embedder,
        fresh_dir.path(),
        5,
        &NoProgress,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let interrupted = LengthEmbedder::new(Some(7));
    let (partial, first) = VectorIndex::build(
        &chunks,
        Window::new(16, 8),
        &interrupted,
        dir.path(),
        5,
        &NoProgress,
    )
    .unwrap();
    assert_eq!(partial.len(), 7);
    assert_eq!(first.failed, 5);

    let resumed_embedder = LengthEmbedder::new(None);
    let (resumed, second) = VectorIndex::build(
        &chunks,
        Window::new(16, 8),
        &resumed_embedder,
        dir.path(),
        5,
        &NoProgress,
    )
    .unwrap();
    assert_eq!(second.skipped, 7);
    assert_eq!(second.computed, 5);
    assert_eq!(resumed_embedder.calls.get(), 5);

    assert_eq!(resumed.len(), fresh.len());
    for chunk in &chunks {
        assert_eq!(resumed.get(&chunk.id), fresh.get(&chunk.id));
    }
}
