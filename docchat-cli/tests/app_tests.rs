//! Document commands against an in-memory pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use docchat_cli::{App, AppConfig};
use docchat_rag::embedding::normalize;
use docchat_rag::{
    EmbeddingProvider, InMemoryVectorStore, LanguageModel, MemoryConfig, RagConfig, RagPipeline,
    Result,
};

struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; 4];
        for (i, c) in text.chars().enumerate() {
            v[i % 4] += c as u32 as f32;
        }
        normalize(&mut v);
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        4
    }
}

struct FixedModel;

#[async_trait]
impl LanguageModel for FixedModel {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok("cevap".to_string())
    }
}

fn app() -> App {
    let pipeline = RagPipeline::builder()
        .config(RagConfig::default())
        .embedding_provider(Arc::new(LetterEmbedder))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .language_model(Arc::new(FixedModel))
        .memory(MemoryConfig::default())
        .build()
        .unwrap();
    App::with_pipeline(AppConfig::default(), pipeline)
}

#[tokio::test]
async fn load_ingests_into_the_document_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notlar.txt");
    std::fs::write(&path, "Birinci sayfa.\x0CIkinci sayfa.").unwrap();

    let mut app = app();
    let report = app.load(&path).await.unwrap();

    assert_eq!(report.collection, "pdf_notlar");
    assert_eq!(report.pages, 2);
    assert_eq!(report.chunks, 2);
    assert_eq!(app.last_loaded(), Some("pdf_notlar"));
    assert_eq!(app.pipeline().active_collection().await.as_deref(), Some("pdf_notlar"));
}

#[tokio::test]
async fn load_of_a_missing_file_fails_without_selecting_anything() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = app();
    assert!(app.load(&dir.path().join("yok.pdf")).await.is_err());
    assert_eq!(app.last_loaded(), None);
}

#[tokio::test]
async fn reset_empties_and_delete_forgets_the_loaded_collection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notlar.md");
    std::fs::write(&path, "Bir not.").unwrap();

    let mut app = app();
    app.load(&path).await.unwrap();

    app.reset("pdf_notlar").await.unwrap();
    assert_eq!(app.pipeline().count().await.unwrap(), 0);
    assert_eq!(app.last_loaded(), Some("pdf_notlar"));

    // Empty collections still exist and can be reset again.
    app.reset("pdf_notlar").await.unwrap();

    app.delete("pdf_notlar").await.unwrap();
    assert_eq!(app.last_loaded(), None);
    assert!(app.pipeline().list_collections().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_collections_are_reported() {
    let mut app = app();
    assert!(app.reset("pdf_yok").await.is_err());
    assert!(app.delete("pdf_yok").await.is_err());
}
