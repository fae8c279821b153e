//! Wiring of the pipeline from configuration, and the document commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use docchat_rag::ollama::{OllamaEmbeddingProvider, OllamaModel};
use docchat_rag::openai::OpenAIEmbeddingProvider;
use docchat_rag::{
    CollectionInfo, EmbeddingProvider, FileVectorStore, IngestReport, LanguageModel, RagPipeline,
};
use tracing::{info, warn};

use crate::config::{AppConfig, EmbeddingBackend, EmbeddingSection};

pub(crate) const RULE: &str = "==================================================";

/// The chatbot: a configured pipeline plus the collection loaded in this run.
pub struct App {
    config: AppConfig,
    pipeline: RagPipeline,
    last_loaded: Option<String>,
}

impl App {
    /// Build every collaborator from `config`: the file-backed store, the
    /// embedding provider, and the Ollama model.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let store = FileVectorStore::open(&config.vector_db.persist_directory)
            .await
            .with_context(|| {
                format!(
                    "failed to open index directory {}",
                    config.vector_db.persist_directory.display()
                )
            })?;
        let embedder = embedding_provider(&config.embedding)?;
        let model = OllamaModel::new(config.llm.clone()).context("failed to create Ollama client")?;
        let model: Arc<dyn LanguageModel> = Arc::new(model);

        let pipeline = RagPipeline::builder()
            .config(config.rag_config()?)
            .messages(config.messages.clone())
            .embedding_provider(embedder)
            .vector_store(Arc::new(store))
            .language_model(model)
            .memory(config.memory.clone())
            .loader(config.loader_config())
            .collection_prefix(config.document.collection_prefix.clone())
            .build()
            .context("failed to build the pipeline")?;

        info!(
            llm = %config.llm.model,
            embedding_model = %config.embedding.model,
            index = %config.vector_db.persist_directory.display(),
            "components initialised"
        );
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Use an already built pipeline.
    pub fn with_pipeline(config: AppConfig, pipeline: RagPipeline) -> Self {
        Self { config, pipeline, last_loaded: None }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    /// Collection ingested by the most recent successful [`load`](Self::load).
    pub fn last_loaded(&self) -> Option<&str> {
        self.last_loaded.as_deref()
    }

    /// Ingest a document and print a short report.
    pub async fn load(&mut self, path: &Path) -> Result<IngestReport> {
        let document = self
            .pipeline
            .loader()
            .load(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let info = &document.info;
        println!("\n{RULE}");
        println!("Doküman Yükleniyor: {}", info.filename);
        println!("Sayfa Sayısı: {}", info.total_pages);
        println!("Dosya Boyutu: {} MB", info.file_size_mb);
        println!("{RULE}\n");

        let report = self
            .pipeline
            .ingest_document(&document)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?;

        println!("✓ {} sayfa işlendi", report.pages);
        println!("✓ {} chunk kaydedildi", report.chunks);
        println!("✓ Collection: {}\n", report.collection);

        self.last_loaded = Some(report.collection.clone());
        Ok(report)
    }

    pub async fn print_collections(&self) -> Result<()> {
        let collections = self.pipeline.list_collections().await?;
        if collections.is_empty() {
            println!("Henüz collection yok.");
            return Ok(());
        }
        for collection in &collections {
            println!("{}", describe(collection));
        }
        Ok(())
    }

    pub async fn reset(&self, name: &str) -> Result<()> {
        self.require_existing(name).await?;
        self.pipeline.reset_collection(name).await?;
        println!("✓ Collection sıfırlandı: {name}");
        Ok(())
    }

    pub async fn delete(&mut self, name: &str) -> Result<()> {
        self.require_existing(name).await?;
        self.pipeline.delete_collection(name).await?;
        if self.last_loaded.as_deref() == Some(name) {
            self.last_loaded = None;
        }
        println!("✓ Collection silindi: {name}");
        Ok(())
    }

    async fn require_existing(&self, name: &str) -> Result<()> {
        let exists = self.pipeline.collection_exists(name).await?;
        anyhow::ensure!(exists, "collection '{name}' does not exist");
        Ok(())
    }

    /// Warn, without failing, when the model server is not ready.
    pub async fn check_model(&self) {
        if let Err(e) = self.pipeline.health_check().await {
            warn!(error = %e, "language model is not available; answers will fail until it is");
        }
    }
}

/// Build the configured embedding provider.
pub fn embedding_provider(config: &EmbeddingSection) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        EmbeddingBackend::Ollama => Arc::new(
            OllamaEmbeddingProvider::new(config.base_url.clone())
                .context("failed to create Ollama embedding client")?
                .with_model(config.model.clone())
                .with_dimensions(config.dimensions),
        ),
        EmbeddingBackend::OpenAi => {
            let provider = match &config.api_key {
                Some(key) => OpenAIEmbeddingProvider::new(key.clone())
                    .context("failed to create OpenAI embedding client")?,
                None => OpenAIEmbeddingProvider::compatible(config.base_url.clone()),
            };
            Arc::new(
                provider.with_model(config.model.clone()).with_native_dimensions(config.dimensions),
            )
        }
    };
    Ok(provider)
}

/// How `chat` picks the collection to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChoice {
    /// The collection loaded in this run.
    Loaded(String),
    /// The only collection with chunks.
    Only(CollectionInfo),
    /// Several candidates; the user must pick one.
    Ask(Vec<CollectionInfo>),
    /// Nothing has been loaded yet.
    Nothing,
}

/// Prefer the collection loaded in this run; otherwise consider only
/// non-empty collections.
pub fn choose_collection(
    loaded: Option<&str>,
    collections: Vec<CollectionInfo>,
) -> CollectionChoice {
    if let Some(name) = loaded {
        return CollectionChoice::Loaded(name.to_string());
    }
    let mut candidates: Vec<CollectionInfo> =
        collections.into_iter().filter(|c| c.count > 0).collect();
    match candidates.len() {
        0 => CollectionChoice::Nothing,
        1 => CollectionChoice::Only(candidates.remove(0)),
        _ => CollectionChoice::Ask(candidates),
    }
}

/// Parse a 1-based menu number into an index below `len`.
pub fn parse_selection(input: &str, len: usize) -> Option<usize> {
    let n: usize = input.trim().parse().ok()?;
    (1..=len).contains(&n).then(|| n - 1)
}

pub(crate) fn describe(collection: &CollectionInfo) -> String {
    format!("{} ({} doküman)", collection.name, collection.count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, count: usize) -> CollectionInfo {
        CollectionInfo { name: name.to_string(), count }
    }

    #[test]
    fn loaded_collection_wins() {
        let choice = choose_collection(Some("pdf_yeni"), vec![info("pdf_eski", 4)]);
        assert_eq!(choice, CollectionChoice::Loaded("pdf_yeni".to_string()));
    }

    #[test]
    fn single_non_empty_collection_is_selected() {
        let choice = choose_collection(None, vec![info("pdf_bos", 0), info("pdf_rapor", 12)]);
        assert_eq!(choice, CollectionChoice::Only(info("pdf_rapor", 12)));
    }

    #[test]
    fn several_collections_require_a_choice() {
        let choice = choose_collection(None, vec![info("pdf_a", 1), info("pdf_b", 2)]);
        assert_eq!(choice, CollectionChoice::Ask(vec![info("pdf_a", 1), info("pdf_b", 2)]));
    }

    #[test]
    fn empty_collections_count_as_nothing() {
        assert_eq!(choose_collection(None, vec![info("pdf_bos", 0)]), CollectionChoice::Nothing);
        assert_eq!(choose_collection(None, Vec::new()), CollectionChoice::Nothing);
    }

    #[test]
    fn selection_is_one_based_and_bounded() {
        assert_eq!(parse_selection(" 1 ", 3), Some(0));
        assert_eq!(parse_selection("3", 3), Some(2));
        assert_eq!(parse_selection("0", 3), None);
        assert_eq!(parse_selection("4", 3), None);
        assert_eq!(parse_selection("iki", 3), None);
    }

    #[test]
    fn embedding_backends_report_configured_dimensions() {
        let ollama = EmbeddingSection { dimensions: 768, ..EmbeddingSection::default() };
        assert_eq!(embedding_provider(&ollama).unwrap().dimensions(), 768);

        let compatible = EmbeddingSection {
            provider: EmbeddingBackend::OpenAi,
            base_url: "http://localhost:11434/v1".to_string(),
            dimensions: 384,
            ..EmbeddingSection::default()
        };
        assert_eq!(embedding_provider(&compatible).unwrap().dimensions(), 384);
    }
}
