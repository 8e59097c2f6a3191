//! Prompt assembly and answer generation.

use ragline_core::error::RagError;
use ragline_core::types::Generation;
use tracing::{error, info};

use crate::CompletionClient;

/// Build the completion prompt for a query and its retrieved passages.
pub fn build_prompt(query: &str, contexts: &[String]) -> String {
    format!("Query: {}\n\nContexts:\n{}", query, contexts.join("\n"))
}

/// Produces answers grounded in retrieved passages.
#[derive(Debug, Clone)]
pub struct AnswerComposer<C: CompletionClient> {
    client: C,
}

impl<C: CompletionClient> AnswerComposer<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Generate an answer to `query` from `contexts`.
    ///
    /// Any failure of the completion request is returned as
    /// [`RagError::Generation`] naming the query; there are no partial answers.
    pub async fn compose(&self, query: &str, contexts: &[String]) -> Result<Generation, RagError> {
        let prompt = build_prompt(query, contexts);

        match self.client.complete(&prompt).await {
            Ok(response) => {
                info!(
                    query = %query,
                    contexts = contexts.len(),
                    response_chars = response.len(),
                    "Answer generated"
                );
                Ok(Generation {
                    query: query.to_string(),
                    response,
                })
            }
            Err(e) => {
                error!(query = %query, error = %e, "Answer generation failed");
                Err(RagError::Generation {
                    query: query.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::CompletionError;
    use ragline_core::error::ErrorKind;

    /// Records prompts and replies with a fixed outcome.
    struct RecordingClient {
        prompts: Mutex<Vec<String>>,
        reply: Result<String, u16>,
    }

    impl RecordingClient {
        fn replying(text: &str) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Ok(text.to_string()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                reply: Err(status),
            }
        }
    }

    impl CompletionClient for RecordingClient {
        async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(CompletionError::Status {
                    status: *status,
                    body: "boom".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt("What is X?", &["X is a letter.".into(), "X marks.".into()]);
        assert_eq!(
            prompt,
            "Query: What is X?\n\nContexts:\nX is a letter.\nX marks."
        );
    }

    #[test]
    fn test_build_prompt_without_contexts() {
        assert_eq!(build_prompt("q", &[]), "Query: q\n\nContexts:\n");
    }

    #[tokio::test]
    async fn test_compose_success() {
        let composer = AnswerComposer::new(RecordingClient::replying("X is a letter."));
        let generation = composer
            .compose("What is X?", &["X is a letter.".to_string()])
            .await
            .unwrap();
        assert_eq!(generation.query, "What is X?");
        assert_eq!(generation.response, "X is a letter.");

        let prompts = composer.client().prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("Query: What is X?"));
    }

    #[tokio::test]
    async fn test_compose_failure_names_query() {
        let composer = AnswerComposer::new(RecordingClient::failing(500));
        let err = composer.compose("why?", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generation);
        let message = err.to_string();
        assert!(message.contains("why?"));
        assert!(message.contains("500"));
    }
}
