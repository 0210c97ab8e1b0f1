//! Hugging Face Inference API backends.
//!
//! This module is only available when the `huggingface` feature is enabled.
//! Both backends call the hosted inference endpoints directly with `reqwest`
//! and authenticate with an optional hub access token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generator::Generator;

/// The default Inference API base URL.
pub const DEFAULT_API_BASE: &str = "https://api-inference.huggingface.co";

/// The default sentence embedding model.
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// The default text-to-text generation model.
pub const DEFAULT_GENERATION_MODEL: &str = "google/flan-t5-base";

/// Connection settings shared by both backends.
#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub api_base: String,
    pub model: String,
    pub token: Option<String>,
}

impl HuggingFaceConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self { api_base: DEFAULT_API_BASE.to_string(), model: model.into(), token: None }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the hub access token. Empty tokens are ignored.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }
}

fn post(client: &reqwest::Client, url: &str, token: Option<&str>) -> reqwest::RequestBuilder {
    let request = client.post(url);
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Turn a non-success response into a readable message.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

// ── Embeddings ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a [&'a str],
    options: InferenceOptions,
}

/// An [`EmbeddingProvider`] backed by the feature-extraction pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::huggingface::{HuggingFaceConfig, HuggingFaceEmbeddingProvider};
///
/// let provider = HuggingFaceEmbeddingProvider::new(
///     HuggingFaceConfig::new("sentence-transformers/all-MiniLM-L6-v2"),
/// );
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct HuggingFaceEmbeddingProvider {
    client: reqwest::Client,
    config: HuggingFaceConfig,
}

impl HuggingFaceEmbeddingProvider {
    pub fn new(config: HuggingFaceConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    fn url(&self) -> String {
        format!("{}/pipeline/feature-extraction/{}", self.config.api_base, self.config.model)
    }

    fn err(&self, message: impl Into<String>) -> RagError {
        RagError::Embedding { provider: self.config.model.clone(), message: message.into() }
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = "HuggingFace", text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| self.err("API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = "HuggingFace",
            batch_size = texts.len(),
            model = %self.config.model,
            "embedding batch"
        );

        let body = FeatureExtractionRequest {
            inputs: texts,
            options: InferenceOptions { wait_for_model: true },
        };
        let response = post(&self.client, &self.url(), self.config.token.as_deref())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "HuggingFace", error = %e, "request failed");
                self.err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = "HuggingFace", %detail, "API error");
            return Err(self.err(detail));
        }

        response.json::<Vec<Vec<f32>>>().await.map_err(|e| {
            error!(provider = "HuggingFace", error = %e, "failed to parse response");
            self.err(format!("failed to parse response: {e}"))
        })
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

// ── Generation ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
    options: InferenceOptions,
}

#[derive(Serialize)]
struct GenerationParameters {
    max_new_tokens: usize,
}

#[derive(Deserialize)]
struct GeneratedText {
    generated_text: String,
}

/// A [`Generator`] backed by the text(2text)-generation pipeline.
pub struct HuggingFaceGenerator {
    client: reqwest::Client,
    config: HuggingFaceConfig,
}

impl HuggingFaceGenerator {
    pub fn new(config: HuggingFaceConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }

    fn err(&self, message: impl Into<String>) -> RagError {
        RagError::Generation { backend: self.config.model.clone(), message: message.into() }
    }
}

#[async_trait]
impl Generator for HuggingFaceGenerator {
    async fn generate(&self, prompt: &str, max_new_tokens: usize) -> Result<String> {
        debug!(
            backend = "HuggingFace",
            model = %self.config.model,
            prompt_len = prompt.len(),
            max_new_tokens,
            "generating"
        );

        let url = format!("{}/models/{}", self.config.api_base, self.config.model);
        let body = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters { max_new_tokens },
            options: InferenceOptions { wait_for_model: true },
        };
        let response = post(&self.client, &url, self.config.token.as_deref())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(backend = "HuggingFace", error = %e, "request failed");
                self.err(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(backend = "HuggingFace", %detail, "API error");
            return Err(self.err(detail));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| self.err(format!("failed to parse response: {e}")))?;
        parse_generated_text(value).map_err(|message| self.err(message))
    }
}

/// Accepts both `[{"generated_text": ..}]` and `{"generated_text": ..}`.
fn parse_generated_text(value: Value) -> std::result::Result<String, String> {
    let first = match value {
        Value::Array(items) => items.into_iter().next().ok_or("API returned no generations")?,
        other => other,
    };
    serde_json::from_value::<GeneratedText>(first)
        .map(|g| g.generated_text.trim().to_string())
        .map_err(|e| format!("unexpected response shape: {e}"))
}
