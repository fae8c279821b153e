//! Retrieval-augmented question answering over ingested documents.
//!
//! This crate provides:
//! - Recursive, overlap-aware chunking with page provenance
//! - An embedding index with one active collection per document, backed by an
//!   in-memory or file-persisted vector store
//! - Threshold-filtered retrieval, grounded prompt assembly, and source citations
//! - Buffer, window, and summary conversation memory
//! - The [`RagPipeline`] orchestrator, with blocking and streaming answers
//!
//! HTTP backends are behind features: `ollama` (generation and embeddings),
//! `openai` (OpenAI-compatible embeddings), and `pdf` (PDF page extraction).

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filestore;
pub mod index;
pub mod inmemory;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod vectorstore;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, RecursiveChunker};
pub use config::{
    AnswerMessages, DEFAULT_SEPARATORS, LoaderConfig, MemoryConfig, MemoryKind, ModelConfig,
    RagConfig, RagConfigBuilder,
};
pub use document::{
    Chunk, ChunkMetadata, CollectionInfo, IndexedChunk, MetadataFilter, MetadataValue, Page,
    RetrievedChunk,
};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use filestore::FileVectorStore;
pub use index::EmbeddingIndex;
pub use inmemory::InMemoryVectorStore;
pub use llm::LanguageModel;
pub use loader::{
    DEFAULT_COLLECTION_PREFIX, DocumentInfo, DocumentLoader, LoadedDocument, collection_name_for,
};
pub use memory::{ConversationMemory, ConversationTurn, MemoryVariables};
pub use pipeline::{
    AnswerOutcome, IngestReport, RagAnswer, RagPipeline, RagPipelineBuilder, StreamingAnswer,
};
pub use prompt::SourceCitation;
pub use retriever::{Retrieval, Retriever};
pub use vectorstore::VectorStore;
