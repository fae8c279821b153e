//! Configuration for the RAG pipeline and its collaborators.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Separators tried in order by the chunker: paragraph break, line break,
/// sentence end, space, and finally single characters.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Configuration parameters for the RAG pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Separators for recursive splitting, most preferred first.
    pub separators: Vec<String>,
    /// Number of nearest neighbours requested from the index.
    pub top_k: usize,
    /// Minimum similarity (`1 - distance`) for a chunk to be used as context.
    pub similarity_threshold: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 150,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            top_k: 5,
            similarity_threshold: 0.5,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0`
    /// - `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `similarity_threshold` is outside `[0, 1]`
    /// - `separators` is empty
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::ConfigError(format!(
                "similarity_threshold ({}) must be within [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.separators.is_empty() {
            return Err(RagError::ConfigError("separators must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Replace the separator list used for recursive splitting.
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    /// Set the number of nearest neighbours requested from the index.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Which conversation memory variant to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Keep every turn.
    #[default]
    Buffer,
    /// Keep only the most recent `window_size` turns.
    Window,
    /// Keep a running summary produced by the language model.
    Summary,
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryConfig {
    /// Whether turns are recorded and injected into prompts at all.
    pub enabled: bool,
    /// Memory variant.
    pub kind: MemoryKind,
    /// Number of turns retained by the window variant.
    pub window_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { enabled: true, kind: MemoryKind::Buffer, window_size: 10 }
    }
}

/// Document loader settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Largest accepted document, in megabytes.
    pub max_file_size_mb: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { max_file_size_mb: 50 }
    }
}

impl LoaderConfig {
    /// The size limit in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Fixed answers returned when no language-model answer is produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnswerMessages {
    /// The index returned no candidates.
    pub no_information: String,
    /// Candidates exist but none clears the similarity threshold.
    pub below_threshold: String,
    /// Embedding, search, or generation failed.
    pub generation_failed: String,
}

impl Default for AnswerMessages {
    fn default() -> Self {
        Self {
            no_information: "İlgili bilgi bulunamadı.".to_string(),
            below_threshold: "İlgili bilgi bulunamadı (benzerlik eşiğinin altında).".to_string(),
            generation_failed: "Üzgünüm, cevap oluşturulurken bir hata oluştu.".to_string(),
        }
    }
}

/// Settings for an HTTP language model backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the model server.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of generated tokens.
    pub max_tokens: u32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mistral".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 30,
        }
    }
}
