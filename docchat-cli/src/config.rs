//! Application configuration loaded from YAML with environment overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docchat_rag::{
    AnswerMessages, DEFAULT_COLLECTION_PREFIX, LoaderConfig, MemoryConfig, ModelConfig, RagConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Full application configuration.
///
/// Every section is optional in the file; missing keys take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub document: DocumentSection,
    pub chunking: ChunkingSection,
    pub embedding: EmbeddingSection,
    pub vector_db: VectorDbSection,
    pub llm: ModelConfig,
    pub rag: RagSection,
    pub memory: MemoryConfig,
    pub messages: AnswerMessages,
    pub cli: CliSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DocumentSection {
    /// Largest accepted document, in megabytes.
    pub max_file_size_mb: u64,
    /// Collection names are `{collection_prefix}_{file stem}`.
    pub collection_prefix: String,
}

impl Default for DocumentSection {
    fn default() -> Self {
        Self {
            max_file_size_mb: LoaderConfig::default().max_file_size_mb,
            collection_prefix: DEFAULT_COLLECTION_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingSection {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkingSection {
    fn default() -> Self {
        let defaults = RagConfig::default();
        Self {
            chunk_size: defaults.chunk_size,
            chunk_overlap: defaults.chunk_overlap,
            separators: defaults.separators,
        }
    }
}

/// Which embedding API to call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama's native `/api/embed`.
    #[default]
    Ollama,
    /// An OpenAI-compatible `/embeddings` endpoint.
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingSection {
    pub provider: EmbeddingBackend,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    /// Only used by the `openai` provider. With a key the hosted OpenAI API
    /// is called and `base_url` is ignored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "all-minilm".to_string(),
            dimensions: 384,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VectorDbSection {
    /// Directory holding one JSON file per collection.
    pub persist_directory: PathBuf,
}

impl Default for VectorDbSection {
    fn default() -> Self {
        Self { persist_directory: PathBuf::from("./data/index") }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagSection {
    pub top_k: usize,
    pub similarity_threshold: f32,
}

impl Default for RagSection {
    fn default() -> Self {
        let defaults = RagConfig::default();
        Self { top_k: defaults.top_k, similarity_threshold: defaults.similarity_threshold }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliSection {
    /// Print the cited passages after each answer.
    pub show_sources: bool,
}

impl Default for CliSection {
    fn default() -> Self {
        Self { show_sources: true }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing file is not an error: defaults are used and the fact is
    /// logged. An unreadable or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Parse configuration from YAML text. Empty text yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides read through `lookup`. Empty values are
    /// ignored.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `OLLAMA_BASE_URL` | `llm.base_url` |
    /// | `OLLAMA_MODEL` | `llm.model` |
    /// | `EMBEDDING_MODEL` | `embedding.model` |
    /// | `EMBEDDING_BASE_URL` | `embedding.base_url` |
    /// | `INDEX_PERSIST_DIRECTORY` | `vector_db.persist_directory` |
    /// | `OPENAI_API_KEY` | `embedding.api_key` |
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OLLAMA_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("OLLAMA_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Some(v) = get("INDEX_PERSIST_DIRECTORY") {
            self.vector_db.persist_directory = PathBuf::from(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.embedding.api_key = Some(v);
        }
    }

    /// The validated retrieval and chunking parameters.
    pub fn rag_config(&self) -> Result<RagConfig> {
        RagConfig::builder()
            .chunk_size(self.chunking.chunk_size)
            .chunk_overlap(self.chunking.chunk_overlap)
            .separators(self.chunking.separators.clone())
            .top_k(self.rag.top_k)
            .similarity_threshold(self.rag.similarity_threshold)
            .build()
            .context("invalid chunking or rag settings")
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig { max_file_size_mb: self.document.max_file_size_mb }
    }
}
