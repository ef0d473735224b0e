//! OpenAI-compatible HTTP collaborators.
//!
//! [`OpenAIEmbeddingProvider`] calls a `/embeddings` endpoint (OpenAI,
//! Hugging Face text-embeddings-inference, vLLM, ...) and
//! [`OpenAIChatGenerator`] calls a `/chat/completions` endpoint (OpenRouter
//! by default).
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;

/// Default OpenRouter API base.
pub const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Default embedding model. Produces 1024-dimensional vectors.
pub const DEFAULT_EMBEDDING_MODEL: &str = "BAAI/bge-m3";

/// Dimensionality of [`DEFAULT_EMBEDDING_MODEL`].
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1024;

/// Default generation model.
pub const DEFAULT_CHAT_MODEL: &str = "arcee-ai/trinity-large-preview:free";

/// Default sampling temperature for answers.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Send a JSON POST and decode the success body, or describe the failure.
async fn post_json<B: Serialize, T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
) -> std::result::Result<T, String> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(|e| format!("request failed: {e}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
        return Err(format!("API returned {status}: {detail}"));
    }

    response.json().await.map_err(|e| format!("failed to parse response: {e}"))
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible embeddings API.
///
/// # Example
///
/// ```rust,ignore
/// use qanun_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("http://127.0.0.1:8080/v1")
///     .with_model("BAAI/bge-m3")
///     .with_dimensions(1024);
/// let embedding = provider.embed("ما هي أحكام المادة 23؟").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a provider for the API rooted at `base_url` (e.g. `https://api.openai.com/v1`).
    ///
    /// Uses [`DEFAULT_EMBEDDING_MODEL`] and [`DEFAULT_EMBEDDING_DIMENSIONS`].
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }

    /// Authenticate with a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the dimensionality the model is expected to produce.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::embedding(self.name(), "input text must not be empty"));
        }
        debug!(provider = self.name(), model = %self.model, text_len = text.len(), "embedding text");

        let request_body = EmbeddingRequest { model: &self.model, input: vec![text] };
        let url = endpoint(&self.base_url, "embeddings");
        let response: EmbeddingResponse =
            post_json(&self.client, &url, self.api_key.as_deref(), &request_body).await.map_err(
                |message| {
                    error!(provider = self.name(), %message, "embedding request failed");
                    RagError::embedding(self.name(), message)
                },
            )?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::embedding(self.name(), "API returned empty response"))?;

        if embedding.len() != self.dimensions {
            return Err(RagError::embedding(
                self.name(),
                format!("model returned {} dimensions, expected {}", embedding.len(), self.dimensions),
            ));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "OpenAI-embeddings"
    }
}

/// A [`GenerationProvider`] backed by an OpenAI-compatible chat completions API.
///
/// The prompt is sent as a single user message.
///
/// # Example
///
/// ```rust,ignore
/// use qanun_rag::openai::{OpenAIChatGenerator, OPENROUTER_API_BASE};
///
/// let llm = OpenAIChatGenerator::new(OPENROUTER_API_BASE, std::env::var("OPENROUTER_API_KEY")?)?;
/// let answer = llm.generate("...").await?;
/// ```
pub struct OpenAIChatGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAIChatGenerator {
    /// Create a generator for the API rooted at `base_url`.
    ///
    /// Uses [`DEFAULT_CHAT_MODEL`] and [`DEFAULT_TEMPERATURE`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `api_key` is empty.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("generation API key must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: DEFAULT_CHAT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    /// Set the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl GenerationProvider for OpenAIChatGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = self.name(), model = %self.model, prompt_len = prompt.len(), "generating answer");

        let request_body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
        };
        let url = endpoint(&self.base_url, "chat/completions");
        let response: ChatResponse = post_json(&self.client, &url, Some(&self.api_key), &request_body)
            .await
            .map_err(|message| {
                error!(provider = self.name(), %message, "chat completion failed");
                RagError::generation(self.name(), message)
            })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::generation(self.name(), "API returned no message content"))
    }

    fn name(&self) -> &str {
        "OpenAI-chat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("https://openrouter.ai/api/v1/", "chat/completions"),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(
            endpoint("http://localhost:8080/v1", "embeddings"),
            "http://localhost:8080/v1/embeddings"
        );
    }

    #[test]
    fn chat_generator_requires_api_key() {
        assert!(matches!(
            OpenAIChatGenerator::new(OPENROUTER_API_BASE, ""),
            Err(RagError::ConfigError(_))
        ));
    }

    #[test]
    fn chat_request_serializes_single_user_message() {
        let body = ChatRequest {
            model: "m",
            messages: [ChatMessage { role: "user", content: "hi" }],
            temperature: 0.1,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hi");
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_request() {
        let provider = OpenAIEmbeddingProvider::new("http://127.0.0.1:9");
        let err = provider.embed("   ").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailure { .. }));
    }
}
