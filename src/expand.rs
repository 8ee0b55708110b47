//! Query expansion.
//!
//! Short questions share few terms with the entries that answer them
//! ("when is Rob's birthday" vs. "party for Rob tonight"). Before ranking,
//! the model can append related words (for TF-IDF) or restate the question
//! the way a journal would phrase it (for embeddings).

use crate::llm::{CompletionModel, CompletionOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionStyle {
    /// Keywords and synonyms, for lexical matching.
    Keywords,
    /// A first-person journal-style statement, for embedding.
    Paraphrase,
}

const KEYWORDS_PROMPT: &str = "List up to ten keywords and synonyms that would appear in a personal journal entry answering the question below. Reply with the words on one line separated by spaces. Do not explain anything.

Question:
{question}
";

const PARAPHRASE_PROMPT: &str = "Rewrite the question below as one or two sentences the author might have written in their journal about it. Reply with the sentences only.

Question:
{question}
";

pub fn expansion_prompt(question: &str, style: ExpansionStyle) -> String {
    let template = match style {
        ExpansionStyle::Keywords => KEYWORDS_PROMPT,
        ExpansionStyle::Paraphrase => PARAPHRASE_PROMPT,
    };
    template.replace("{question}", question)
}

/// `question` followed by the model's expansion. Falls back to the bare
/// question when the model fails or says nothing.
pub fn expand_query(model: &dyn CompletionModel, question: &str, style: ExpansionStyle) -> String {
    match model.complete(&expansion_prompt(question, style), &CompletionOptions::text()) {
        Ok(completion) => {
            let extra = completion.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if extra.is_empty() {
                question.to_string()
            } else {
                tracing::debug!(%extra, ?style, "expanded query");
                format!("{} {}", question, extra)
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "query expansion failed, using the question as is");
            question.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Completion;
    use anyhow::Result;

    struct Fixed(Option<&'static str>);

    impl CompletionModel for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<Completion> {
            match self.0 {
                Some(text) => Ok(Completion {
                    text: text.to_string(),
                    ..Default::default()
                }),
                None => anyhow::bail!("connection refused"),
            }
        }
    }

    #[test]
    fn test_expansion_appended() {
        let expanded = expand_query(
            &Fixed(Some("birthday\nparty  cake\n")),
            "when is Rob's birthday?",
            ExpansionStyle::Keywords,
        );
        assert_eq!(expanded, "when is Rob's birthday? birthday party cake");
    }

    #[test]
    fn test_failure_falls_back() {
        let q = "where did I go in May?";
        assert_eq!(expand_query(&Fixed(None), q, ExpansionStyle::Paraphrase), q);
        assert_eq!(expand_query(&Fixed(Some("  ")), q, ExpansionStyle::Keywords), q);
    }

    #[test]
    fn test_prompts_differ_by_style() {
        assert!(expansion_prompt("q", ExpansionStyle::Keywords).contains("keywords"));
        assert!(expansion_prompt("q", ExpansionStyle::Paraphrase).contains("journal about it"));
    }
}
