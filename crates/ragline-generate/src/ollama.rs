//! Client for an Ollama-compatible `/api/generate` endpoint.

use std::time::Duration;

use ragline_core::config::GenerationConfig;
use ragline_core::error::RagError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{CompletionClient, CompletionError};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// Sampling options that make decoding repeatable.
#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    seed: u64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Non-streaming completion client.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(url: &str, model: &str, timeout: Duration) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(url, model, timeout_secs = timeout.as_secs_f64(), "Completion client configured");
        Ok(Self {
            client,
            url: url.to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, RagError> {
        Self::new(
            &config.url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionClient for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.0,
                seed: 0,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| CompletionError::Decode(e.to_string()))?;
        debug!(chars = parsed.response.len(), "Completion received");
        Ok(parsed.response)
    }
}
