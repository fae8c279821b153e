//! Embedding index with an active collection.
//!
//! [`EmbeddingIndex`] sits on top of a [`VectorStore`] and tracks which
//! collection subsequent inserts and searches target. Exactly one collection
//! is active at a time once [`switch_collection`](EmbeddingIndex::switch_collection)
//! has been called.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::document::{
    ChunkMetadata, CollectionInfo, IndexedChunk, MetadataFilter, RetrievedChunk,
};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// A vector store view with a single active collection.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{EmbeddingIndex, InMemoryVectorStore};
///
/// let mut index = EmbeddingIndex::new(Arc::new(InMemoryVectorStore::new()), 384);
/// index.switch_collection("pdf_guide").await?;
/// index.add_documents(&texts, &vectors, &metadatas, &ids).await?;
/// let hits = index.search(&query_vector, 5, None).await?;
/// ```
pub struct EmbeddingIndex {
    store: Arc<dyn VectorStore>,
    dimensions: usize,
    active: Option<String>,
}

impl EmbeddingIndex {
    /// Create an index with no active collection.
    ///
    /// `dimensions` is the embedding size collections are created with.
    pub fn new(store: Arc<dyn VectorStore>, dimensions: usize) -> Self {
        Self { store, dimensions, active: None }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Name of the active collection, if any.
    pub fn active_collection(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Make `name` the active collection, creating it if absent.
    ///
    /// Existing contents are preserved; switching to the already active
    /// collection changes nothing. Returns `true` when the active collection
    /// changed.
    pub async fn switch_collection(&mut self, name: &str) -> Result<bool> {
        if name.trim().is_empty() {
            return Err(RagError::Validation("collection name must not be empty".to_string()));
        }
        self.store.create_collection(name, self.dimensions).await?;

        if self.active.as_deref() == Some(name) {
            debug!(collection = name, "collection already active");
            return Ok(false);
        }
        self.active = Some(name.to_string());
        info!(collection = name, "switched active collection");
        Ok(true)
    }

    /// Insert parallel arrays into the active collection.
    ///
    /// Chunks with an id already present are overwritten. Returns the number
    /// of chunks written.
    ///
    /// # Errors
    ///
    /// - [`RagError::Validation`] if the arrays are empty, differ in length,
    ///   contain blank text, or repeat an id. Nothing is written.
    /// - [`RagError::NotReady`] if no collection is active.
    pub async fn add_documents(
        &self,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[ChunkMetadata],
        ids: &[String],
    ) -> Result<usize> {
        let collection = self.require_active()?;

        if texts.is_empty() {
            return Err(RagError::Validation("cannot add an empty batch".to_string()));
        }
        if vectors.len() != texts.len() || metadatas.len() != texts.len() || ids.len() != texts.len()
        {
            return Err(RagError::Validation(format!(
                "parallel arrays differ in length: {} texts, {} vectors, {} metadatas, {} ids",
                texts.len(),
                vectors.len(),
                metadatas.len(),
                ids.len()
            )));
        }
        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RagError::Validation(format!("text for id '{}' is empty", ids[i])));
        }
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(RagError::Validation(format!("duplicate id '{dup}' in batch")));
        }

        let records: Vec<IndexedChunk> = texts
            .iter()
            .zip(vectors)
            .zip(metadatas)
            .zip(ids)
            .map(|(((text, embedding), metadata), id)| IndexedChunk {
                id: id.clone(),
                text: text.clone(),
                embedding: embedding.clone(),
                metadata: metadata.clone(),
            })
            .collect();

        self.store.upsert(collection, &records).await?;
        info!(collection, chunk_count = records.len(), "added documents");
        Ok(records.len())
    }

    /// Nearest neighbours of `query_vector` in the active collection, most
    /// similar first.
    ///
    /// An empty collection, or a filter that matches nothing, yields an empty
    /// `Vec`.
    pub async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let collection = self.require_active()?;
        let filter = filter.filter(|f| !f.is_empty());
        let results = self.store.search(collection, query_vector, top_k, filter).await?;
        debug!(collection, top_k, result_count = results.len(), "searched collection");
        Ok(results)
    }

    /// Number of chunks in the active collection.
    pub async fn count(&self) -> Result<usize> {
        let collection = self.require_active()?;
        self.store.count(collection).await
    }

    /// Every persisted collection with its chunk count, sorted by name.
    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.store.list_collections().await
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.store.collection_exists(name).await
    }

    /// Destroy a collection. If it was active, no collection is active
    /// afterwards.
    pub async fn delete_collection(&mut self, name: &str) -> Result<()> {
        self.store.delete_collection(name).await?;
        if self.active.as_deref() == Some(name) {
            self.active = None;
        }
        info!(collection = name, "deleted collection");
        Ok(())
    }

    /// Empty a collection by destroying and recreating it. The active
    /// collection is unchanged.
    pub async fn reset_collection(&self, name: &str) -> Result<()> {
        self.store.delete_collection(name).await?;
        self.store.create_collection(name, self.dimensions).await?;
        info!(collection = name, "reset collection");
        Ok(())
    }

    fn require_active(&self) -> Result<&str> {
        self.active.as_deref().ok_or_else(|| {
            RagError::NotReady("no active collection; load or select a document first".to_string())
        })
    }
}
