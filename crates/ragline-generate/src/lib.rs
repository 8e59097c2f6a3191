//! Answer generation for Ragline.
//!
//! Builds a prompt from a query and its retrieved passages and sends it to a
//! completion endpoint. The CompletionClient trait is the seam between the
//! two; OllamaClient talks to an Ollama-compatible `/api/generate` endpoint.

pub mod composer;
pub mod ollama;

use thiserror::Error;

pub use composer::{build_prompt, AnswerComposer};
pub use ollama::OllamaClient;

/// Failure of a single completion request.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("undecodable response: {0}")]
    Decode(String),
}

/// A text completion backend.
pub trait CompletionClient: Send + Sync {
    /// Complete `prompt` and return the generated text.
    fn complete(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, CompletionError>> + Send;
}
