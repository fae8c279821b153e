//! Vector store trait for storing and searching vector embeddings.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{CollectionInfo, IndexedChunk, MetadataFilter, RetrievedChunk};
use crate::error::{RagError, Result};

/// A storage backend for vector embeddings with cosine similarity search.
///
/// Implementations manage named collections of [`IndexedChunk`]s and support
/// upserting and searching by cosine distance. Every collection uses the
/// cosine space, so search distances are always in `[0, 2]`.
///
/// # Example
///
/// ```rust,ignore
/// use docchat_rag::{VectorStore, InMemoryVectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("pdf_guide", 384).await?;
/// store.upsert("pdf_guide", &chunks).await?;
/// let results = store.search("pdf_guide", &query_embedding, 5, None).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists; existing
    /// contents are preserved.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Whether a collection with this name exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert chunks into a collection, replacing chunks with the same id.
    async fn upsert(&self, collection: &str, chunks: &[IndexedChunk]) -> Result<()>;

    /// Search for the `top_k` nearest chunks to the given embedding.
    ///
    /// Returns results ordered by ascending cosine distance. The optional
    /// filter narrows the candidates before ranking. An empty collection or
    /// a filter that matches nothing yields an empty `Vec`.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Number of chunks stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// All collections with their chunk counts, sorted by name.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;
}

/// Contents of one collection, shared by the bundled stores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub(crate) struct CollectionData {
    pub name: String,
    pub dimensions: usize,
    pub records: Vec<IndexedChunk>,
}

impl CollectionData {
    pub fn new(name: &str, dimensions: usize) -> Self {
        Self { name: name.to_string(), dimensions, records: Vec::new() }
    }

    /// Validate the batch, then replace records with matching ids in place
    /// and append the rest in batch order.
    pub fn upsert(&mut self, backend: &str, chunks: &[IndexedChunk]) -> Result<()> {
        if self.dimensions == 0 {
            if let Some(first) = chunks.first() {
                self.dimensions = first.embedding.len();
            }
        }
        for chunk in chunks {
            if chunk.embedding.len() != self.dimensions {
                return Err(RagError::Validation(format!(
                    "chunk '{}' has {} dimensions, collection '{}' expects {} ({backend})",
                    chunk.id,
                    chunk.embedding.len(),
                    self.name,
                    self.dimensions
                )));
            }
        }

        let mut positions: HashMap<String, usize> =
            self.records.iter().enumerate().map(|(i, r)| (r.id.clone(), i)).collect();
        for chunk in chunks {
            match positions.get(&chunk.id) {
                Some(&i) => self.records[i] = chunk.clone(),
                None => {
                    positions.insert(chunk.id.clone(), self.records.len());
                    self.records.push(chunk.clone());
                }
            }
        }
        Ok(())
    }

    /// Rank records by cosine distance to `embedding`.
    ///
    /// Ties keep insertion order.
    pub fn nearest(
        &self,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<RetrievedChunk> {
        let mut scored: Vec<RetrievedChunk> = self
            .records
            .iter()
            .filter(|record| filter.is_none_or(|f| f.matches(&record.metadata)))
            .map(|record| RetrievedChunk {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance: cosine_distance(&record.embedding, embedding),
            })
            .collect();

        scored.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

/// Cosine distance `1 - cos` between two vectors, in `[0, 2]`.
///
/// Opposite vectors are at distance 2, so their similarity is negative and
/// no threshold in `[0, 1]` keeps them. Returns 1.0 if either vector has zero
/// magnitude.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    // Rounding can push the quotient just past ±1.
    1.0 - (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
