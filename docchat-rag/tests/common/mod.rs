//! Deterministic test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docchat_rag::embedding::normalize;
use docchat_rag::{
    EmbeddingProvider, InMemoryVectorStore, LanguageModel, MemoryConfig, RagConfig, RagError,
    RagPipeline, Result, VectorStore,
};
use futures::stream::{self, BoxStream, StreamExt};

/// Hash-based embeddings: same text, same direction.
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyInput);
        }
        let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let mut embedding: Vec<f32> =
            (0..self.dimensions).map(|i| (hash.wrapping_add(i as u64) as f32).sin()).collect();
        normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Embeddings looked up by exact text, with a fallback vector for anything
/// not in the table. Used to pin similarities in scenarios.
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    calls: AtomicUsize,
}

impl TableEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self { table: HashMap::new(), fallback, calls: AtomicUsize::new(0) }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyInput);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.table.get(text).cloned().unwrap_or_else(|| self.fallback.clone()))
    }

    fn dimensions(&self) -> usize {
        self.fallback.len()
    }
}

/// An embedder whose backend is down.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingError { provider: "test".into(), message: "backend down".into() })
    }

    fn dimensions(&self) -> usize {
        2
    }
}

enum Script {
    Reply(String),
    Unreachable,
    FailMidStream(Vec<String>),
}

/// A language model that follows a fixed script and records every prompt.
pub struct ScriptedModel {
    script: Script,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn with_script(script: Script) -> Arc<Self> {
        Arc::new(Self { script, prompts: Mutex::new(Vec::new()), calls: AtomicUsize::new(0) })
    }

    /// Always answers `text`; streams it word by word.
    pub fn replying(text: &str) -> Arc<Self> {
        Self::with_script(Script::Reply(text.to_string()))
    }

    /// Always fails with [`RagError::ModelUnreachable`].
    pub fn unreachable() -> Arc<Self> {
        Self::with_script(Script::Unreachable)
    }

    /// Streams `fragments`, then fails.
    pub fn failing_mid_stream(fragments: &[&str]) -> Arc<Self> {
        Self::with_script(Script::FailMidStream(fragments.iter().map(|f| f.to_string()).collect()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    fn record(&self, prompt: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
    }

    fn unreachable_error() -> RagError {
        RagError::ModelUnreachable { provider: "scripted".into(), message: "connection refused".into() }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.record(prompt);
        match &self.script {
            Script::Reply(text) => Ok(format!("  {text}\n")),
            Script::Unreachable => Err(Self::unreachable_error()),
            Script::FailMidStream(fragments) => Ok(fragments.concat()),
        }
    }

    async fn generate_stream(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        self.record(prompt);
        match &self.script {
            Script::Reply(text) => {
                let words: Vec<Result<String>> =
                    text.split_inclusive(' ').map(|w| Ok(w.to_string())).collect();
                Ok(stream::iter(words).boxed())
            }
            Script::Unreachable => Err(Self::unreachable_error()),
            Script::FailMidStream(fragments) => {
                let mut items: Vec<Result<String>> =
                    fragments.iter().map(|f| Ok(f.clone())).collect();
                items.push(Err(RagError::ModelError {
                    provider: "scripted".into(),
                    message: "stream reset".into(),
                }));
                Ok(stream::iter(items).boxed())
            }
        }
    }
}

/// A pipeline over an in-memory store.
pub fn pipeline(
    embedder: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn LanguageModel>,
    config: RagConfig,
    memory: MemoryConfig,
) -> RagPipeline {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .vector_store(store)
        .language_model(model)
        .memory(memory)
        .build()
        .unwrap()
}

/// Words repeated up to (but not beyond) `max_len` characters.
pub fn paragraph(word: &str, max_len: usize) -> String {
    let mut text = String::new();
    while text.len() + word.len() + 1 <= max_len {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(word);
    }
    text
}
