//! Error types for the `docchat-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Malformed input to a core operation. Nothing was applied.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation needs configuration that has not been supplied yet,
    /// such as an active collection.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// An embedding was requested for blank text.
    #[error("Cannot embed empty or whitespace-only text")]
    EmptyInput,

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model endpoint could not be reached.
    #[error("Model unreachable ({provider}): {message}")]
    ModelUnreachable {
        /// The model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The language model did not answer within the configured timeout.
    #[error("Model request timed out ({provider}) after {timeout_secs}s")]
    ModelTimeout {
        /// The model provider that produced the error.
        provider: String,
        /// The timeout that elapsed.
        timeout_secs: u64,
    },

    /// The language model answered with an error or an unreadable response.
    #[error("Model error ({provider}): {message}")]
    ModelError {
        /// The model provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The document path does not exist.
    #[error("Document not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The document is not in a supported format.
    #[error("Unsupported document format: {0}")]
    InvalidFormat(String),

    /// The document exceeds the configured size limit.
    #[error("Document too large: {size_bytes} bytes (limit {limit_bytes} bytes)")]
    TooLarge {
        /// Size of the rejected file.
        size_bytes: u64,
        /// Configured maximum.
        limit_bytes: u64,
    },

    /// No text could be extracted from the document (it may be image based).
    #[error("No text could be extracted from {}", .0.display())]
    NoText(PathBuf),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the RAG pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Persisted data could not be encoded or decoded.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether this error came from an external collaborator (embedding
    /// backend, language model, or index storage).
    ///
    /// Upstream failures during a query are converted into the apologetic
    /// answer instead of being returned to the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingError { .. }
                | RagError::VectorStoreError { .. }
                | RagError::ModelUnreachable { .. }
                | RagError::ModelTimeout { .. }
                | RagError::ModelError { .. }
                | RagError::EmptyInput
                | RagError::Io(_)
                | RagError::Serialization(_)
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
