//! Ollama backends: text generation over `/api/generate` and embeddings over
//! `/api/embed`.
//!
//! This module is only available when the `ollama` feature is enabled.

use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::ModelConfig;
use crate::embedding::{EmbeddingProvider, ensure_not_blank, normalize};
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

const PROVIDER: &str = "Ollama";

/// Default embedding model (`all-MiniLM-L6-v2` as packaged by Ollama).
const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

/// Dimensionality of [`DEFAULT_EMBEDDING_MODEL`].
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{path}", base_url.trim_end_matches('/'))
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| RagError::ConfigError(format!("HTTP client: {e}")))
}

// ── /api/generate request/response types ───────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// A [`LanguageModel`] served by a local Ollama instance.
///
/// Non-streaming requests are bounded by `timeout_secs`. Streaming requests
/// apply the same bound to the initial response and to every gap between
/// fragments, so long answers are not cut off while tokens keep arriving.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{ModelConfig, ollama::OllamaModel};
///
/// let model = OllamaModel::new(ModelConfig::default())?;
/// model.health_check().await?;
/// let answer = model.generate("Merhaba").await?;
/// ```
pub struct OllamaModel {
    client: reqwest::Client,
    config: ModelConfig,
}

impl OllamaModel {
    /// Create a model client from configuration.
    pub fn new(config: ModelConfig) -> Result<Self> {
        Ok(Self { client: build_client()?, config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn request_body<'a>(&'a self, prompt: &'a str, stream: bool) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.config.model,
            prompt,
            stream,
            options: GenerateOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        }
    }

    fn send_error(&self, e: reqwest::Error) -> RagError {
        if e.is_timeout() {
            let timeout_secs = self.config.timeout_secs;
            error!(provider = PROVIDER, timeout_secs, "request timed out");
            RagError::ModelTimeout {
                provider: PROVIDER.into(),
                timeout_secs: self.config.timeout_secs,
            }
        } else if e.is_connect() {
            let base_url = &self.config.base_url;
            error!(provider = PROVIDER, %base_url, error = %e, "server unreachable");
            RagError::ModelUnreachable {
                provider: PROVIDER.into(),
                message: format!("cannot reach {}: {e}", self.config.base_url),
            }
        } else {
            error!(provider = PROVIDER, error = %e, "request failed");
            RagError::ModelError {
                provider: PROVIDER.into(),
                message: format!("request failed: {e}"),
            }
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
        error!(provider = PROVIDER, %status, "API error");
        Err(RagError::ModelError {
            provider: PROVIDER.into(),
            message: format!("API returned {status}: {detail}"),
        })
    }
}

/// Parse one NDJSON line. Blank and unparsable lines yield `None`.
fn parse_line(line: &[u8]) -> Result<Option<GenerateChunk>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }
    match serde_json::from_slice::<GenerateChunk>(line) {
        Ok(chunk) => match chunk.error {
            Some(message) => Err(RagError::ModelError { provider: PROVIDER.into(), message }),
            None => Ok(Some(chunk)),
        },
        Err(e) => {
            debug!(provider = PROVIDER, error = %e, "skipping unparsable stream line");
            Ok(None)
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.config.model, prompt_len = prompt.len(), "generate");

        let response = self
            .client
            .post(endpoint(&self.config.base_url, "api/generate"))
            .timeout(self.timeout())
            .json(&self.request_body(prompt, false))
            .send()
            .await
            .map_err(|e| self.send_error(e))?;
        let response = Self::check_status(response).await?;

        let body: GenerateChunk = response.json().await.map_err(|e| {
            if e.is_timeout() {
                return self.send_error(e);
            }
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::ModelError {
                provider: PROVIDER.into(),
                message: format!("failed to parse response: {e}"),
            }
        })?;
        if let Some(message) = body.error {
            return Err(RagError::ModelError { provider: PROVIDER.into(), message });
        }
        Ok(body.response)
    }

    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        debug!(provider = PROVIDER, model = %self.config.model, prompt_len = prompt.len(), "stream");

        let timeout = self.timeout();
        let timeout_secs = self.config.timeout_secs;
        let request = self
            .client
            .post(endpoint(&self.config.base_url, "api/generate"))
            .json(&self.request_body(prompt, true))
            .send();
        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| RagError::ModelTimeout { provider: PROVIDER.into(), timeout_secs })?
            .map_err(|e| self.send_error(e))?;
        let response = Self::check_status(response).await?;
        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut done = false;

            while !done {
                let next = tokio::time::timeout(timeout, bytes.next())
                    .await
                    .map_err(|_| RagError::ModelTimeout { provider: PROVIDER.into(), timeout_secs })?;
                let Some(chunk) = next else { break };
                let chunk = chunk.map_err(|e| RagError::ModelError {
                    provider: PROVIDER.into(),
                    message: format!("stream interrupted: {e}"),
                })?;
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(parsed) = parse_line(&line)? {
                        if !parsed.response.is_empty() {
                            yield parsed.response;
                        }
                        if parsed.done {
                            done = true;
                            break;
                        }
                    }
                }
            }

            if !done {
                if let Some(parsed) = parse_line(&buffer)? {
                    if !parsed.response.is_empty() {
                        yield parsed.response;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Lists `/api/tags` and warns if the configured model is not pulled.
    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(endpoint(&self.config.base_url, "api/tags"))
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(|e| RagError::ModelUnreachable {
                provider: PROVIDER.into(),
                message: format!(
                    "cannot reach {}: {e}; is `ollama serve` running?",
                    self.config.base_url
                ),
            })?;
        let response = Self::check_status(response).await?;
        let tags: TagsResponse = response.json().await.map_err(|e| RagError::ModelError {
            provider: PROVIDER.into(),
            message: format!("failed to parse model list: {e}"),
        })?;

        let names: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
        if has_model(&names, &self.config.model) {
            info!(provider = PROVIDER, model = %self.config.model, "model available");
        } else {
            warn!(
                provider = PROVIDER,
                model = %self.config.model,
                available = %names.join(", "),
                "model not found; run `ollama pull {}`",
                self.config.model
            );
        }
        Ok(())
    }
}

/// Ollama lists untagged pulls as `name:latest`.
fn has_model(available: &[&str], model: &str) -> bool {
    available.iter().any(|name| *name == model || name.strip_suffix(":latest") == Some(model))
}

// ── /api/embed ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// An [`EmbeddingProvider`] backed by Ollama's `/api/embed` endpoint.
///
/// Vectors are L2-normalized before they are returned.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::ollama::OllamaEmbeddingProvider;
///
/// let provider = OllamaEmbeddingProvider::new("http://localhost:11434")?
///     .with_model("nomic-embed-text")
///     .with_dimensions(768);
/// ```
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for the server at `base_url` using `all-minilm`
    /// (384 dimensions).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        })
    }

    /// Set the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the dimensionality the model produces.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    fn embedding_error(message: String) -> RagError {
        RagError::EmbeddingError { provider: PROVIDER.into(), message }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::embedding_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            ensure_not_blank(text)?;
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding");

        let response = self
            .client
            .post(endpoint(&self.base_url, "api/embed"))
            .json(&EmbedRequest { model: &self.model, input: texts.to_vec() })
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                Self::embedding_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error).unwrap_or(body);
            error!(provider = PROVIDER, %status, "API error");
            return Err(Self::embedding_error(format!("API returned {status}: {detail}")));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            Self::embedding_error(format!("failed to parse response: {e}"))
        })?;

        if body.embeddings.len() != texts.len() {
            return Err(Self::embedding_error(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        let mut embeddings = body.embeddings;
        for embedding in &mut embeddings {
            if embedding.len() != self.dimensions {
                return Err(Self::embedding_error(format!(
                    "model '{}' returned {} dimensions, expected {}",
                    self.model,
                    embedding.len(),
                    self.dimensions
                )));
            }
            normalize(embedding);
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
