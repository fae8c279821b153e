//! Data types for pages, chunks, and search results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Text of a single document page as produced by the loader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number in the source document.
    pub page: u32,
    /// Extracted page text.
    pub text: String,
}

impl Page {
    /// Create a page.
    pub fn new(page: u32, text: impl Into<String>) -> Self {
        Self { page, text: text.into() }
    }
}

/// Provenance attached to every [`Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// File name of the document the chunk came from.
    pub source_file: String,
    /// Page the chunk was cut from (1-based).
    pub page: u32,
    /// Running counter over the whole document, starting at 1.
    pub chunk_id: u32,
    /// Length of the chunk text in characters.
    pub chunk_size: usize,
}

impl ChunkMetadata {
    /// Look up a metadata field by name for equality filtering.
    pub fn field(&self, name: &str) -> Option<MetadataValue> {
        match name {
            "source_file" => Some(MetadataValue::Text(self.source_file.clone())),
            "page" => Some(MetadataValue::Int(i64::from(self.page))),
            "chunk_id" => Some(MetadataValue::Int(i64::from(self.chunk_id))),
            "chunk_size" => Some(MetadataValue::Int(self.chunk_size as i64)),
            _ => None,
        }
    }
}

/// A bounded, citable unit of document text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Trimmed, non-empty chunk text.
    pub text: String,
    /// Where the chunk came from.
    pub metadata: ChunkMetadata,
}

/// A [`Chunk`] with its embedding, as stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedChunk {
    /// Unique identifier within the collection (`{source_file}_chunk_{n}`).
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// The vector embedding for this chunk's text.
    pub embedding: Vec<f32>,
    /// Provenance of the chunk.
    pub metadata: ChunkMetadata,
}

/// A chunk returned by a nearest-neighbour search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    /// Identifier of the stored chunk.
    pub id: String,
    /// The chunk text.
    pub text: String,
    /// Provenance of the chunk.
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query, in `[0, 2]`.
    pub distance: f32,
}

impl RetrievedChunk {
    /// Cosine similarity to the query (`1 - distance`).
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// A scalar metadata value used by [`MetadataFilter`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Integer field such as `page` or `chunk_id`.
    Int(i64),
    /// Text field such as `source_file`.
    Text(String),
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        MetadataValue::Int(i64::from(value))
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Int(i64::from(value))
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Int(v) => write!(f, "{v}"),
            MetadataValue::Text(v) => f.write_str(v),
        }
    }
}

/// Equality filter over chunk metadata fields.
///
/// A chunk matches when every condition matches. Conditions on unknown
/// fields never match.
///
/// ```rust,ignore
/// let filter = MetadataFilter::new().where_eq("page", 2u32);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, MetadataValue>,
}

impl MetadataFilter {
    /// Create an empty filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check the filter against a chunk's metadata.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| metadata.field(field).is_some_and(|v| &v == expected))
    }
}

/// Name and size of a persisted collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Number of stored chunks.
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ChunkMetadata {
        ChunkMetadata { source_file: "guide.pdf".into(), page: 2, chunk_id: 7, chunk_size: 120 }
    }

    #[test]
    fn filter_matches_all_conditions() {
        let filter = MetadataFilter::new().where_eq("page", 2u32).where_eq("source_file", "guide.pdf");
        assert!(filter.matches(&metadata()));

        let wrong_page = MetadataFilter::new().where_eq("page", 3u32);
        assert!(!wrong_page.matches(&metadata()));
    }

    #[test]
    fn filter_on_unknown_field_never_matches() {
        let filter = MetadataFilter::new().where_eq("author", "someone");
        assert!(!filter.matches(&metadata()));
        assert!(MetadataFilter::new().matches(&metadata()));
    }

    #[test]
    fn similarity_is_one_minus_distance() {
        let chunk = RetrievedChunk {
            id: "guide.pdf_chunk_7".into(),
            text: "text".into(),
            metadata: metadata(),
            distance: 0.25,
        };
        assert!((chunk.similarity() - 0.75).abs() < f32::EPSILON);
    }
}
