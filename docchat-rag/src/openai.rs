//! OpenAI-compatible embedding provider (`/v1/embeddings`).
//!
//! Works against the OpenAI API and against servers that mirror it, such as
//! Ollama's `/v1` endpoint. This module is only available when the `openai`
//! feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::{EmbeddingProvider, ensure_not_blank, normalize};
use crate::error::{RagError, Result};

const PROVIDER: &str = "OpenAI";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;

/// An [`EmbeddingProvider`] for OpenAI-style `/embeddings` endpoints.
///
/// A bearer key is sent only when one was given to [`new`](Self::new).
/// Returned vectors are normalized to unit length.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::compatible("http://localhost:11434/v1")
///     .with_model("all-minilm")
///     .with_dimensions(384);
/// let embedding = provider.embed("merhaba dünya").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    /// Sent as `dimensions` when set.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Provider for the hosted OpenAI API. The key must not be empty.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(embedding_error("API key must not be empty".to_string()));
        }
        Ok(Self { api_key: Some(api_key), ..Self::compatible(OPENAI_BASE_URL) })
    }

    /// Provider for a keyless OpenAI-compatible server rooted at `base_url`
    /// (e.g. `http://localhost:11434/v1`).
    pub fn compatible(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Declare the size the model natively produces. Nothing is sent to the
    /// server.
    pub fn with_native_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = None;
        self
    }

    /// Ask the server to shorten embeddings to `dims` (models with
    /// Matryoshka support only).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

fn embedding_error(message: String) -> RagError {
    RagError::EmbeddingError { provider: PROVIDER.into(), message }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| embedding_error("server returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        texts.iter().try_for_each(|t| ensure_not_blank(t))?;
        debug!(provider = PROVIDER, model = %self.model, batch_size = texts.len(), "embedding");

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let mut request = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "embedding request failed");
            embedding_error(format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail =
                serde_json::from_str::<ApiError>(&body).map(|e| e.error.message).unwrap_or(body);
            error!(provider = PROVIDER, %status, "embedding request rejected");
            return Err(embedding_error(format!("server returned {status}: {detail}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| embedding_error(format!("malformed response: {e}")))?;
        let mut data = parsed.data;
        if data.len() != texts.len() {
            return Err(embedding_error(format!(
                "asked for {} embeddings, received {}",
                texts.len(),
                data.len()
            )));
        }
        // Entries may arrive out of order; `index` restores input order.
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));

        let mut vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        vectors.iter_mut().for_each(|v| normalize(v));
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
