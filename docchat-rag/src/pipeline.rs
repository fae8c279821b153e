//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates document ingestion (load → chunk → embed →
//! store) and question answering (embed → search → filter → generate →
//! record) by composing an [`EmbeddingProvider`], a [`VectorStore`], a
//! [`Chunker`], and a [`LanguageModel`].
//!
//! Each question ends in one of four [`AnswerOutcome`]s. Only
//! [`AnswerOutcome::Answered`] involves the language model and only that
//! outcome is recorded in conversation memory. Upstream failures (embedding,
//! search, or generation) never escape a query; they become the apologetic
//! [`AnswerOutcome::GenerationFailed`] answer.
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat_rag::{RagPipeline, RagConfig, FileVectorStore};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .vector_store(Arc::new(FileVectorStore::open("./data/index").await?))
//!     .language_model(Arc::new(model))
//!     .build()?;
//!
//! pipeline.ingest_file("rapor.pdf".as_ref()).await?;
//! let answer = pipeline.query("Rapor neyi anlatıyor?").await?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::{AnswerMessages, LoaderConfig, MemoryConfig, RagConfig};
use crate::document::{CollectionInfo, MetadataFilter, Page, RetrievedChunk};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::EmbeddingIndex;
use crate::llm::LanguageModel;
use crate::loader::{
    DEFAULT_COLLECTION_PREFIX, DocumentLoader, LoadedDocument, collection_name_for,
};
use crate::memory::{ConversationMemory, ConversationTurn, MemoryVariables};
use crate::prompt::{SourceCitation, build_prompt, format_context, format_sources};
use crate::retriever::{Retrieval, Retriever};
use crate::vectorstore::VectorStore;

/// How a question was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The language model answered from retrieved passages.
    Answered,
    /// The index had no candidates.
    NoInformation,
    /// Candidates existed but none reached the similarity threshold.
    BelowThreshold,
    /// Embedding, search, or generation failed.
    GenerationFailed,
}

/// A complete answer with its citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    /// Trimmed answer text.
    pub answer: String,
    /// Passages the answer was grounded on, most similar first. Empty unless
    /// the outcome is [`AnswerOutcome::Answered`].
    pub sources: Vec<SourceCitation>,
    /// How the question was resolved.
    pub outcome: AnswerOutcome,
}

/// An answer delivered as a stream of text fragments.
///
/// `fragments` is finite and cannot be restarted. The pipeline session stays
/// locked until the stream is consumed or dropped. The turn is recorded in
/// memory only when the stream is consumed to the end without a model error.
pub struct StreamingAnswer {
    /// Citations, known before generation starts.
    pub sources: Vec<SourceCitation>,
    /// How the question is being resolved. A mid-stream model failure still
    /// reports [`AnswerOutcome::Answered`] here; the failure shows up as the
    /// apologetic message in the last fragment.
    pub outcome: AnswerOutcome,
    /// Answer text, in order.
    pub fragments: BoxStream<'static, String>,
}

impl std::fmt::Debug for StreamingAnswer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAnswer")
            .field("sources", &self.sources)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Collection the document was written to; now the active collection.
    pub collection: String,
    /// Pages that contributed text.
    pub pages: usize,
    /// Chunks written.
    pub chunks: usize,
}

struct SessionState {
    index: EmbeddingIndex,
    memory: Option<ConversationMemory>,
}

impl SessionState {
    fn clear_memory(&mut self) {
        if let Some(memory) = self.memory.as_mut() {
            memory.clear();
        }
    }
}

/// The RAG pipeline orchestrator.
///
/// The active collection and the conversation memory live behind one async
/// mutex, so at most one question is in flight per pipeline and switching
/// collections never interleaves with a query. Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    messages: AnswerMessages,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    language_model: Arc<dyn LanguageModel>,
    chunker: Arc<dyn Chunker>,
    loader: DocumentLoader,
    collection_prefix: String,
    retriever: Retriever,
    session: Arc<Mutex<SessionState>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return the fixed answers in use.
    pub fn messages(&self) -> &AnswerMessages {
        &self.messages
    }

    /// Return a reference to the language model.
    pub fn language_model(&self) -> &Arc<dyn LanguageModel> {
        &self.language_model
    }

    /// Return the document loader.
    pub fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    /// Collection name a document file is ingested into.
    pub fn collection_for(&self, filename: &str) -> String {
        collection_name_for(filename, &self.collection_prefix)
    }

    // ── Ingestion ──────────────────────────────────────────────────

    /// Load, chunk, embed, and store a document file, then make its
    /// collection active.
    ///
    /// # Errors
    ///
    /// Loader errors ([`RagError::NotFound`], [`RagError::InvalidFormat`],
    /// [`RagError::TooLarge`], [`RagError::NoText`]) and any embedding or
    /// store failure. Ingest failures are never converted into answers.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let document = self.loader.load(path).await?;
        self.ingest_document(&document).await
    }

    /// Store a document already read with [`DocumentLoader::load`].
    pub async fn ingest_document(&self, document: &LoadedDocument) -> Result<IngestReport> {
        if document.info.filename.is_empty() {
            return Err(RagError::Validation(format!(
                "{} has no file name",
                document.info.path.display()
            )));
        }
        self.ingest_pages(&document.info.filename, &document.pages).await
    }

    /// Chunk, embed, and store already extracted pages under the collection
    /// derived from `source_file`, then make that collection active.
    ///
    /// Chunk ids are `"{source_file}_chunk_{n}"`, so ingesting the same
    /// document again overwrites its chunks instead of duplicating them.
    /// Memory is cleared if the active collection changes.
    pub async fn ingest_pages(&self, source_file: &str, pages: &[Page]) -> Result<IngestReport> {
        let chunks = self.chunker.split_pages(pages, source_file);
        if chunks.is_empty() {
            return Err(RagError::NoText(PathBuf::from(source_file)));
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
            error!(source_file, error = %e, "embedding failed during ingest");
            e
        })?;
        if vectors.len() != chunks.len() {
            return Err(RagError::Validation(format!(
                "embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let ids: Vec<String> =
            chunks.iter().map(|c| format!("{source_file}_chunk_{}", c.metadata.chunk_id)).collect();
        let metadatas: Vec<_> = chunks.iter().map(|c| c.metadata.clone()).collect();
        let texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();

        let collection = self.collection_for(source_file);
        let mut session = self.session.lock().await;
        if session.index.switch_collection(&collection).await? {
            session.clear_memory();
        }
        let written = session.index.add_documents(&texts, &vectors, &metadatas, &ids).await?;
        let total = session.index.count().await?;

        let pages_with_text = {
            let mut numbers: Vec<u32> = metadatas.iter().map(|m| m.page).collect();
            numbers.dedup();
            numbers.len()
        };
        info!(
            source_file,
            collection = %collection,
            pages = pages_with_text,
            chunk_count = written,
            collection_count = total,
            "document ingested"
        );
        Ok(IngestReport { collection, pages: pages_with_text, chunks: written })
    }

    // ── Collection administration ──────────────────────────────────

    /// Make `name` the active collection, creating it if needed. Memory is
    /// cleared when the active collection changes.
    pub async fn switch_collection(&self, name: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.index.switch_collection(name).await? {
            session.clear_memory();
        }
        Ok(())
    }

    /// Name of the active collection, if any.
    pub async fn active_collection(&self) -> Option<String> {
        self.session.lock().await.index.active_collection().map(str::to_string)
    }

    /// Number of chunks in the active collection.
    pub async fn count(&self) -> Result<usize> {
        self.session.lock().await.index.count().await
    }

    /// Every persisted collection with its chunk count, sorted by name.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.session.lock().await.index.list_collections().await
    }

    /// Whether a collection named `name` exists, empty or not.
    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.session.lock().await.index.collection_exists(name).await
    }

    /// Delete a collection. Deleting the active collection leaves none
    /// active and clears memory.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        let was_active = session.index.active_collection() == Some(name);
        session.index.delete_collection(name).await?;
        if was_active {
            session.clear_memory();
        }
        Ok(())
    }

    /// Empty a collection in place. Resetting the active collection clears
    /// memory.
    pub async fn reset_collection(&self, name: &str) -> Result<()> {
        let mut session = self.session.lock().await;
        session.index.reset_collection(name).await?;
        if session.index.active_collection() == Some(name) {
            session.clear_memory();
        }
        Ok(())
    }

    /// Forget the conversation so far.
    pub async fn clear_memory(&self) {
        self.session.lock().await.clear_memory();
        info!("conversation memory cleared");
    }

    /// Current memory contents, or `None` when memory is disabled.
    pub async fn memory_variables(&self) -> Option<MemoryVariables> {
        self.session.lock().await.memory.as_ref().map(ConversationMemory::variables)
    }

    /// Check that the language model backend is ready.
    pub async fn health_check(&self) -> Result<()> {
        self.language_model.health_check().await
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Answer a question from the active collection.
    ///
    /// # Errors
    ///
    /// Only [`RagError::Validation`] for a blank question and
    /// [`RagError::NotReady`] when no collection is active. Upstream
    /// failures produce an [`AnswerOutcome::GenerationFailed`] answer.
    pub async fn query(&self, question: &str) -> Result<RagAnswer> {
        self.query_with_filter(question, None).await
    }

    /// Like [`query`](Self::query), restricting candidates with a metadata
    /// filter before ranking.
    pub async fn query_with_filter(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<RagAnswer> {
        let question = validate_question(question)?;
        let mut session = self.session.lock().await;

        let chunks = match self.retrieve(&session, question, filter).await? {
            Ok(chunks) => chunks,
            Err(outcome) => return Ok(self.fixed_answer(outcome)),
        };

        let prompt = self.assemble_prompt(&session, &chunks, question);
        let sources = format_sources(&chunks);
        debug!(prompt_len = prompt.len(), source_count = sources.len(), "generating answer");

        let answer = match self.language_model.generate(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                error!(model = self.language_model.name(), error = %e, "generation failed");
                return Ok(self.fixed_answer(AnswerOutcome::GenerationFailed));
            }
        };

        if let Some(memory) = session.memory.as_mut() {
            record_turn(memory, question, &answer).await;
        }

        info!(source_count = sources.len(), answer_len = answer.len(), "query completed");
        Ok(RagAnswer { answer, sources, outcome: AnswerOutcome::Answered })
    }

    /// Answer a question as a stream of fragments.
    ///
    /// Retrieval outcomes are the same as for [`query`](Self::query); fixed
    /// answers arrive as a single fragment.
    pub async fn query_stream(&self, question: &str) -> Result<StreamingAnswer> {
        self.query_stream_with_filter(question, None).await
    }

    /// Like [`query_stream`](Self::query_stream), with a metadata filter.
    pub async fn query_stream_with_filter(
        &self,
        question: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<StreamingAnswer> {
        let question = validate_question(question)?;
        let mut session = Arc::clone(&self.session).lock_owned().await;

        let chunks = match self.retrieve(&session, question, filter).await? {
            Ok(chunks) => chunks,
            Err(outcome) => return Ok(self.fixed_stream(outcome)),
        };

        let prompt = self.assemble_prompt(&session, &chunks, question);
        let sources = format_sources(&chunks);

        let mut fragments = match self.language_model.generate_stream(&prompt).await {
            Ok(fragments) => fragments,
            Err(e) => {
                let model = self.language_model.name();
                error!(model, error = %e, "generation failed to start");
                return Ok(self.fixed_stream(AnswerOutcome::GenerationFailed));
            }
        };

        let question = question.to_string();
        let failure_message = self.messages.generation_failed.clone();
        let model_name = self.language_model.name().to_string();

        let stream = async_stream::stream! {
            let mut answer = String::new();
            let mut failed = false;

            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(text) => {
                        answer.push_str(&text);
                        yield text;
                    }
                    Err(e) => {
                        error!(model = %model_name, error = %e, "generation failed mid-stream");
                        failed = true;
                        yield failure_message.clone();
                        break;
                    }
                }
            }

            if !failed {
                let answer = answer.trim();
                if let Some(memory) = session.memory.as_mut() {
                    record_turn(memory, &question, answer).await;
                }
                info!(answer_len = answer.len(), "streaming query completed");
            }
        };

        Ok(StreamingAnswer {
            sources,
            outcome: AnswerOutcome::Answered,
            fragments: Box::pin(stream),
        })
    }

    /// Retrieve passages for a question.
    ///
    /// The outer `Result` carries errors for the caller; the inner one is
    /// `Err(outcome)` when the question resolves to a fixed answer.
    async fn retrieve(
        &self,
        session: &SessionState,
        question: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<std::result::Result<Vec<RetrievedChunk>, AnswerOutcome>> {
        debug!(question_len = question.len(), "retrieving");
        match self.retriever.retrieve(&session.index, question, filter).await {
            Ok(Retrieval::Found(chunks)) => Ok(Ok(chunks)),
            Ok(Retrieval::Empty) => {
                info!("no candidates in collection");
                Ok(Err(AnswerOutcome::NoInformation))
            }
            Ok(Retrieval::BelowThreshold { best_similarity }) => {
                let threshold = self.retriever.threshold();
                info!(best_similarity, threshold, "no candidate above threshold");
                Ok(Err(AnswerOutcome::BelowThreshold))
            }
            Err(e) if e.is_upstream() => {
                error!(error = %e, "retrieval failed");
                Ok(Err(AnswerOutcome::GenerationFailed))
            }
            Err(e) => Err(e),
        }
    }

    fn assemble_prompt(
        &self,
        session: &SessionState,
        chunks: &[RetrievedChunk],
        question: &str,
    ) -> String {
        let history = session.memory.as_ref().map(ConversationMemory::variables);
        build_prompt(&format_context(chunks), question, history.as_ref())
    }

    fn fixed_message(&self, outcome: AnswerOutcome) -> &str {
        match outcome {
            AnswerOutcome::NoInformation => &self.messages.no_information,
            AnswerOutcome::BelowThreshold => &self.messages.below_threshold,
            AnswerOutcome::GenerationFailed | AnswerOutcome::Answered => {
                &self.messages.generation_failed
            }
        }
    }

    fn fixed_answer(&self, outcome: AnswerOutcome) -> RagAnswer {
        RagAnswer { answer: self.fixed_message(outcome).to_string(), sources: Vec::new(), outcome }
    }

    fn fixed_stream(&self, outcome: AnswerOutcome) -> StreamingAnswer {
        let message = self.fixed_message(outcome).to_string();
        StreamingAnswer {
            sources: Vec::new(),
            outcome,
            fragments: stream::once(async move { message }).boxed(),
        }
    }
}

fn validate_question(question: &str) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::Validation("question must not be empty".to_string()));
    }
    Ok(trimmed)
}

/// Record a turn, logging instead of failing: the answer has already been
/// produced.
async fn record_turn(memory: &mut ConversationMemory, question: &str, answer: &str) {
    if let Err(e) = memory.record(ConversationTurn::new(question, answer)).await {
        warn!(error = %e, "failed to update conversation memory");
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider`, `vector_store`, and `language_model` are required.
/// Everything else has a default: [`RagConfig::default()`], a
/// [`RecursiveChunker`] built from the config, buffer memory, a 50 MB loader
/// limit, and the `pdf` collection prefix.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .language_model(Arc::new(model))
///     .memory(MemoryConfig { kind: MemoryKind::Window, ..Default::default() })
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    messages: Option<AnswerMessages>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    chunker: Option<Arc<dyn Chunker>>,
    memory: Option<MemoryConfig>,
    loader: Option<LoaderConfig>,
    collection_prefix: Option<String>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the fixed answers.
    pub fn messages(mut self, messages: AnswerMessages) -> Self {
        self.messages = Some(messages);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the language model.
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Replace the default chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set conversation memory settings.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Set document loader limits.
    pub fn loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the prefix of collection names derived from file names.
    pub fn collection_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.collection_prefix = Some(prefix.into());
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing or
    /// the configuration is inconsistent.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let language_model = self
            .language_model
            .ok_or_else(|| RagError::ConfigError("language_model is required".to_string()))?;

        let chunker =
            self.chunker.unwrap_or_else(|| Arc::new(RecursiveChunker::from_config(&config)));
        let memory_config = self.memory.unwrap_or_default();
        let memory = if memory_config.enabled {
            let model = Some(Arc::clone(&language_model));
            Some(ConversationMemory::from_config(&memory_config, model)?)
        } else {
            None
        };

        let collection_prefix =
            self.collection_prefix.unwrap_or_else(|| DEFAULT_COLLECTION_PREFIX.to_string());
        if collection_prefix.is_empty() {
            return Err(RagError::ConfigError("collection_prefix must not be empty".to_string()));
        }

        let index = EmbeddingIndex::new(vector_store, embedding_provider.dimensions());
        let retriever = Retriever::new(
            Arc::clone(&embedding_provider),
            config.top_k,
            config.similarity_threshold,
        );

        Ok(RagPipeline {
            config,
            messages: self.messages.unwrap_or_default(),
            embedding_provider,
            language_model,
            chunker,
            loader: DocumentLoader::new(self.loader.unwrap_or_default()),
            collection_prefix,
            retriever,
            session: Arc::new(Mutex::new(SessionState { index, memory })),
        })
    }
}
