//! Question → threshold-filtered passages.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::{MetadataFilter, RetrievedChunk};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::EmbeddingIndex;

/// Outcome of a retrieval.
///
/// `Empty` and `BelowThreshold` are answer states, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    /// The index returned no candidates.
    Empty,
    /// Candidates exist but none reaches the threshold.
    BelowThreshold {
        /// Similarity of the closest candidate.
        best_similarity: f32,
    },
    /// Passages at or above the threshold, most similar first.
    Found(Vec<RetrievedChunk>),
}

/// Embeds a question and filters the index's nearest neighbours by
/// similarity.
///
/// Filtering happens after the top-k search, so fewer than `top_k` passages
/// may come back even when more relevant ones exist outside the window.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    threshold: f32,
}

impl Retriever {
    /// Create a retriever.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, top_k: usize, threshold: f32) -> Self {
        Self { embedder, top_k, threshold }
    }

    /// Number of candidates requested from the index.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Minimum similarity kept.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Retrieve passages for `question` from the active collection.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyInput`] / [`RagError::EmbeddingError`] from the
    ///   embedding provider.
    /// - [`RagError::NotReady`] when no collection is active.
    /// - [`RagError::VectorStoreError`] when a distance falls outside
    ///   `[0, 2]`, which means the index is not using cosine space.
    pub async fn retrieve(
        &self,
        index: &EmbeddingIndex,
        question: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Retrieval> {
        let query_vector = self.embedder.embed(question).await?;
        let candidates = index.search(&query_vector, self.top_k, filter).await?;

        if let Some(bad) = candidates.iter().find(|c| !(0.0..=2.0).contains(&c.distance)) {
            warn!(id = %bad.id, distance = bad.distance, "distance outside [0, 2]");
            return Err(RagError::VectorStoreError {
                backend: "index".to_string(),
                message: format!(
                    "distance {} for '{}' is outside [0, 2]; collections must use cosine space",
                    bad.distance, bad.id
                ),
            });
        }

        Ok(self.classify(candidates))
    }

    /// Apply the threshold to an ordered candidate list without reordering.
    pub fn classify(&self, candidates: Vec<RetrievedChunk>) -> Retrieval {
        let Some(best_similarity) = candidates.first().map(RetrievedChunk::similarity) else {
            debug!("no candidates");
            return Retrieval::Empty;
        };

        let kept: Vec<RetrievedChunk> =
            candidates.into_iter().filter(|c| c.similarity() >= self.threshold).collect();

        if kept.is_empty() {
            debug!(best_similarity, threshold = self.threshold, "all candidates below threshold");
            Retrieval::BelowThreshold { best_similarity }
        } else {
            debug!(kept = kept.len(), threshold = self.threshold, "candidates above threshold");
            Retrieval::Found(kept)
        }
    }
}
