//! In-memory vector store using cosine distance.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. Nothing is persisted; it is
//! suitable for tests and throwaway sessions. Use
//! [`FileVectorStore`](crate::FileVectorStore) when the index must survive a
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{CollectionInfo, IndexedChunk, MetadataFilter, RetrievedChunk};
use crate::error::{RagError, Result};
use crate::vectorstore::{CollectionData, VectorStore};

const BACKEND: &str = "InMemory";

/// An in-memory vector store using cosine distance for search.
///
/// Collections are stored as a `HashMap`: collection name → collection data.
/// All operations are async-safe via `tokio::sync::RwLock`.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("pdf_guide", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> RagError {
    RagError::VectorStoreError {
        backend: BACKEND.to_string(),
        message: format!("collection '{collection}' does not exist"),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .entry(name.to_string())
            .or_insert_with(|| CollectionData::new(name, dimensions));
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[IndexedChunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let data = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        data.upsert(BACKEND, chunks)
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        let collections = self.collections.read().await;
        let data = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(data.nearest(embedding, top_k, filter))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let data = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(data.records.len())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read().await;
        let mut infos: Vec<CollectionInfo> = collections
            .values()
            .map(|data| CollectionInfo { name: data.name.clone(), count: data.records.len() })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}
