use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::storage::EmbeddingModel;
use super::suggestion::CompletionModel;
use super::UpstreamError;

const SERVICE: &str = "ollama";

/// Ollama HTTP client for local completion and embedding models.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    completion_model: String,
    embedding_model: String,
}

impl OllamaClient {
    /// Create a client pointing at an Ollama instance. Every request is
    /// bounded by `timeout`; exceeding it is reported as an upstream failure.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        completion_model: &str,
        embedding_model: &str,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: timeout.as_secs(),
            completion_model: completion_model.to_string(),
            embedding_model: embedding_model.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, e: reqwest::Error) -> UpstreamError {
        if e.is_connect() {
            UpstreamError::Connection {
                service: SERVICE,
                url: self.base_url.clone(),
            }
        } else if e.is_timeout() {
            UpstreamError::Timeout {
                service: SERVICE,
                secs: self.timeout_secs,
            }
        } else {
            UpstreamError::HttpClient(e.to_string())
        }
    }

    fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, UpstreamError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .map_err(|e| UpstreamError::ResponseParsing(e.to_string()))
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Request body for Ollama /api/embed
#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Response body from Ollama /api/embed
#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl CompletionModel for OllamaClient {
    fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = GenerateRequest {
            model: &self.completion_model,
            prompt,
            stream: false,
            format: "json",
        };
        let parsed: GenerateResponse = self.post_json("/api/generate", &body)?;
        tracing::debug!(
            model = %self.completion_model,
            chars = parsed.response.len(),
            "Completion received"
        );
        Ok(parsed.response)
    }
}

impl EmbeddingModel for OllamaClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>, UpstreamError> {
        let body = EmbedRequest {
            model: &self.embedding_model,
            input: text,
        };
        let parsed: EmbedResponse = self.post_json("/api/embed", &body)?;
        match parsed.embeddings.into_iter().next() {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(UpstreamError::EmptyEmbedding),
        }
    }
}
