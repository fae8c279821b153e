//! File-backed vector store.
//!
//! [`FileVectorStore`] keeps every collection in memory for search and writes
//! it to `<root>/<collection>.json` after each mutation, so ingested documents
//! survive process restarts. Writes go to a temporary file that is renamed
//! over the previous version.
//!
//! # Example
//!
//! ```rust,ignore
//! use docchat_rag::FileVectorStore;
//!
//! let store = FileVectorStore::open("./data/index").await?;
//! store.create_collection("pdf_guide", 384).await?;
//! store.upsert("pdf_guide", &chunks).await?;
//! let results = store.search("pdf_guide", &query_embedding, 5, None).await?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{CollectionInfo, IndexedChunk, MetadataFilter, RetrievedChunk};
use crate::error::{RagError, Result};
use crate::vectorstore::{CollectionData, VectorStore};

const BACKEND: &str = "File";
const EXTENSION: &str = "json";

/// A [`VectorStore`] persisted as one JSON file per collection under a root
/// directory.
#[derive(Debug)]
pub struct FileVectorStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl FileVectorStore {
    /// Open (or create) a store rooted at `root`, loading every persisted
    /// collection.
    ///
    /// Files that cannot be parsed are skipped with a warning.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let mut collections = HashMap::new();
        let mut entries = fs::read_dir(&root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != EXTENSION) {
                continue;
            }
            match load_collection(&path).await {
                Ok(data) => {
                    collections.insert(data.name.clone(), data);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable collection file")
                }
            }
        }

        info!(root = %root.display(), collection_count = collections.len(), "opened file store");
        Ok(Self { root, collections: RwLock::new(collections) })
    }

    /// Directory the collections are stored in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{EXTENSION}"))
    }

    async fn persist(&self, data: &CollectionData) -> Result<()> {
        let path = self.path_for(&data.name);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let bytes = serde_json::to_vec(data)?;
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        debug!(collection = %data.name, count = data.records.len(), "persisted collection");
        Ok(())
    }
}

async fn load_collection(path: &Path) -> Result<CollectionData> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Collection names become file names, so only `[A-Za-z0-9_-]` is allowed.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(RagError::Validation(format!(
            "invalid collection name '{name}': use letters, digits, '_' or '-'"
        )));
    }
    Ok(())
}

fn missing(collection: &str) -> RagError {
    RagError::VectorStoreError {
        backend: BACKEND.to_string(),
        message: format!("collection '{collection}' does not exist"),
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        validate_name(name)?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(());
        }
        let data = CollectionData::new(name, dimensions);
        self.persist(&data).await?;
        collections.insert(name.to_string(), data);
        info!(collection = name, dimensions, "created collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut collections = self.collections.write().await;
        collections.remove(name);
        match fs::remove_file(self.path_for(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!(collection = name, "deleted collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, chunks: &[IndexedChunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let data = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        // Apply to a copy so a failed write leaves memory and disk in agreement.
        let mut updated = data.clone();
        updated.upsert(BACKEND, chunks)?;
        self.persist(&updated).await?;
        *data = updated;
        Ok(())
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
