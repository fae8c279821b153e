//! End-to-end behaviour of the RAG orchestrator with deterministic doubles.

mod common;

use std::sync::Arc;

use common::{FailingEmbedder, HashEmbedder, ScriptedModel, TableEmbedder, paragraph, pipeline};
use docchat_rag::{
    AnswerMessages, AnswerOutcome, ConversationTurn, MemoryConfig, MemoryKind, MemoryVariables,
    MetadataFilter, Page, RagConfig, RagError,
};
use futures::StreamExt;

fn two_page_document() -> Vec<Page> {
    let page_one = [paragraph("alpha", 400), paragraph("beta", 400), paragraph("gamma", 400)]
        .join("\n\n");
    let page_two = [paragraph("delta", 400), paragraph("epsilon", 400)].join("\n\n");
    vec![Page::new(1, page_one), Page::new(2, page_two)]
}

/// One stored chunk "Kedi" at similarity 0.6 to every question.
fn cat_embedder() -> TableEmbedder {
    TableEmbedder::new(vec![1.0, 0.0]).with("Kedi", vec![0.6, 0.8])
}

/// Every text maps to the same direction, so every question matches.
fn matching_embedder() -> TableEmbedder {
    TableEmbedder::new(vec![1.0, 0.0])
}

#[tokio::test]
async fn two_page_document_yields_five_chunks() {
    let model = ScriptedModel::replying("cevap");
    let pipeline =
        pipeline(Arc::new(HashEmbedder::new(16)), model, RagConfig::default(), MemoryConfig::default());

    let report = pipeline.ingest_pages("rapor.pdf", &two_page_document()).await.unwrap();
    assert_eq!(report.collection, "pdf_rapor");
    assert_eq!(report.pages, 2);
    assert_eq!(report.chunks, 5);
    assert_eq!(pipeline.count().await.unwrap(), 5);
    assert_eq!(pipeline.active_collection().await.as_deref(), Some("pdf_rapor"));
}

#[tokio::test]
async fn reingesting_the_same_document_overwrites_chunks() {
    let model = ScriptedModel::replying("cevap");
    let pipeline =
        pipeline(Arc::new(HashEmbedder::new(16)), model, RagConfig::default(), MemoryConfig::default());

    pipeline.ingest_pages("rapor.pdf", &two_page_document()).await.unwrap();
    pipeline.ingest_pages("rapor.pdf", &two_page_document()).await.unwrap();
    assert_eq!(pipeline.count().await.unwrap(), 5);

    let collections = pipeline.list_collections().await.unwrap();
    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].count, 5);
}

#[tokio::test]
async fn empty_collection_answers_without_calling_the_model() {
    let model = ScriptedModel::replying("cevap");
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        model.clone(),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.switch_collection("pdf_bos").await.unwrap();

    let answer = pipeline.query("Bu belge ne anlatıyor?").await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::NoInformation);
    assert_eq!(answer.answer, AnswerMessages::default().no_information);
    assert!(answer.sources.is_empty());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn best_match_below_threshold_is_reported_distinctly() {
    let model = ScriptedModel::replying("cevap");
    let config = RagConfig::builder().similarity_threshold(0.9).build().unwrap();
    let pipeline =
        pipeline(Arc::new(cat_embedder()), model.clone(), config, MemoryConfig::default());
    pipeline.ingest_pages("hayvan.txt", &[Page::new(1, "Kedi")]).await.unwrap();

    let answer = pipeline.query("Kedi nedir?").await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::BelowThreshold);
    assert_eq!(answer.answer, AnswerMessages::default().below_threshold);
    assert!(answer.sources.is_empty());
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn opposite_passage_is_below_a_zero_threshold() {
    let model = ScriptedModel::replying("cevap");
    let embedder = TableEmbedder::new(vec![1.0, 0.0]).with("Zıt anlam", vec![-1.0, 0.0]);
    let config = RagConfig::builder().similarity_threshold(0.0).build().unwrap();
    let pipeline = pipeline(Arc::new(embedder), model.clone(), config, MemoryConfig::default());
    pipeline.ingest_pages("zit.txt", &[Page::new(1, "Zıt anlam")]).await.unwrap();

    let answer = pipeline.query("Soru?").await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::BelowThreshold);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn answer_is_trimmed_and_cites_sources() {
    let model = ScriptedModel::replying("Kedi bir hayvandır.");
    let pipeline = pipeline(
        Arc::new(cat_embedder()),
        model.clone(),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.ingest_pages("hayvan.txt", &[Page::new(1, "Kedi")]).await.unwrap();

    let answer = pipeline.query("Kedi nedir?").await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::Answered);
    assert_eq!(answer.answer, "Kedi bir hayvandır.");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].source_file, "hayvan.txt");
    assert_eq!(answer.sources[0].page, 1);
    assert_eq!(answer.sources[0].chunk_id, 1);
    assert!((answer.sources[0].similarity - 0.6).abs() < 1e-3);

    let prompt = model.last_prompt().unwrap();
    assert!(prompt.contains("[Kaynak 1 - hayvan.txt, Sayfa 1]\nKedi"));
    assert!(prompt.ends_with("Soru: Kedi nedir?\n\nCevap:"));
}

#[tokio::test]
async fn unreachable_model_degrades_to_apology() {
    let model = ScriptedModel::unreachable();
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        model.clone(),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.ingest_pages("not.txt", &[Page::new(1, "Bir paragraf.")]).await.unwrap();

    let answer = pipeline.query("Ne yazıyor?").await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::GenerationFailed);
    assert_eq!(answer.answer, AnswerMessages::default().generation_failed);
    assert!(answer.sources.is_empty());
    assert_eq!(model.calls(), 1);
    assert_eq!(pipeline.memory_variables().await, Some(MemoryVariables::Turns(Vec::new())));
}

#[tokio::test]
async fn embedding_failure_during_query_degrades_to_apology() {
    let model = ScriptedModel::replying("cevap");
    let pipeline = pipeline(
        Arc::new(FailingEmbedder),
        model.clone(),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.switch_collection("pdf_x").await.unwrap();

    let answer = pipeline.query("Soru?").await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::GenerationFailed);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn query_needs_an_active_collection_and_a_question() {
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        ScriptedModel::replying("cevap"),
        RagConfig::default(),
        MemoryConfig::default(),
    );

    assert!(matches!(pipeline.query("Soru?").await, Err(RagError::NotReady(_))));
    pipeline.switch_collection("pdf_x").await.unwrap();
    assert!(matches!(pipeline.query("   ").await, Err(RagError::Validation(_))));
}

#[tokio::test]
async fn window_memory_keeps_the_last_two_turns() {
    let model = ScriptedModel::replying("cevap");
    let memory = MemoryConfig { kind: MemoryKind::Window, window_size: 2, ..MemoryConfig::default() };
    let pipeline =
        pipeline(Arc::new(matching_embedder()), model.clone(), RagConfig::default(), memory);
    pipeline.ingest_pages("not.txt", &[Page::new(1, "Bir paragraf.")]).await.unwrap();

    for question in ["birinci", "ikinci", "üçüncü"] {
        pipeline.query(question).await.unwrap();
    }

    let prompt = model.last_prompt().unwrap();
    let first = prompt.find("Kullanıcı: birinci").unwrap();
    let second = prompt.find("Kullanıcı: ikinci").unwrap();
    assert!(first < second && second < prompt.find("Doküman İçeriği:").unwrap());

    assert_eq!(
        pipeline.memory_variables().await,
        Some(MemoryVariables::Turns(vec![
            ConversationTurn::new("ikinci", "cevap"),
            ConversationTurn::new("üçüncü", "cevap"),
        ]))
    );
}

#[tokio::test]
async fn switching_collections_clears_memory() {
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        ScriptedModel::replying("cevap"),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.ingest_pages("a.txt", &[Page::new(1, "A belgesi.")]).await.unwrap();
    pipeline.query("soru").await.unwrap();

    pipeline.switch_collection("pdf_a").await.unwrap();
    assert_eq!(
        pipeline.memory_variables().await,
        Some(MemoryVariables::Turns(vec![ConversationTurn::new("soru", "cevap")]))
    );

    pipeline.ingest_pages("b.txt", &[Page::new(1, "B belgesi.")]).await.unwrap();
    assert_eq!(pipeline.active_collection().await.as_deref(), Some("pdf_b"));
    assert_eq!(pipeline.memory_variables().await, Some(MemoryVariables::Turns(Vec::new())));
}

#[tokio::test]
async fn disabled_memory_records_nothing() {
    let memory = MemoryConfig { enabled: false, ..MemoryConfig::default() };
    let model = ScriptedModel::replying("cevap");
    let pipeline =
        pipeline(Arc::new(matching_embedder()), model.clone(), RagConfig::default(), memory);
    pipeline.ingest_pages("a.txt", &[Page::new(1, "A belgesi.")]).await.unwrap();

    pipeline.query("birinci").await.unwrap();
    pipeline.query("ikinci").await.unwrap();
    assert_eq!(pipeline.memory_variables().await, None);
    assert!(!model.last_prompt().unwrap().contains("Önceki Konuşma"));
}

#[tokio::test]
async fn deleting_the_active_collection_leaves_none_active() {
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        ScriptedModel::replying("cevap"),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.ingest_pages("a.txt", &[Page::new(1, "A belgesi.")]).await.unwrap();
    pipeline.delete_collection("pdf_a").await.unwrap();

    assert_eq!(pipeline.active_collection().await, None);
    assert!(matches!(pipeline.query("soru").await, Err(RagError::NotReady(_))));
}

#[tokio::test]
async fn reset_keeps_the_collection_but_empties_it() {
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        ScriptedModel::replying("cevap"),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.ingest_pages("a.txt", &[Page::new(1, "A belgesi.")]).await.unwrap();
    pipeline.reset_collection("pdf_a").await.unwrap();

    assert_eq!(pipeline.count().await.unwrap(), 0);
    assert!(pipeline.collection_exists("pdf_a").await.unwrap());
    assert!(!pipeline.collection_exists("pdf_b").await.unwrap());
    let answer = pipeline.query("soru").await.unwrap();
    assert_eq!(answer.outcome, AnswerOutcome::NoInformation);
}

#[tokio::test]
async fn similar_file_names_get_separate_collections() {
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        ScriptedModel::replying("cevap"),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    let spaced = pipeline.ingest_pages("a b.pdf", &[Page::new(1, "Birinci belge.")]).await.unwrap();
    let joined = pipeline.ingest_pages("a_b.pdf", &[Page::new(1, "Ikinci belge.")]).await.unwrap();

    assert_ne!(spaced.collection, joined.collection);
    assert_eq!(joined.collection, "pdf_a_b");
    let collections = pipeline.list_collections().await.unwrap();
    assert_eq!(collections.len(), 2);
    assert!(collections.iter().all(|c| c.count == 1));
}

#[tokio::test]
async fn filter_narrows_candidates_before_ranking() {
    let embedder = TableEmbedder::new(vec![1.0, 0.0])
        .with("Birinci sayfa.", vec![1.0, 0.0])
        .with("İkinci sayfa.", vec![0.8, 0.6]);
    let model = ScriptedModel::replying("cevap");
    let pipeline =
        pipeline(Arc::new(embedder), model.clone(), RagConfig::default(), MemoryConfig::default());
    pipeline
        .ingest_pages(
            "iki.txt",
            &[Page::new(1, "Birinci sayfa."), Page::new(2, "İkinci sayfa.")],
        )
        .await
        .unwrap();

    let filter = MetadataFilter::new().where_eq("page", 2u32);
    let answer = pipeline.query_with_filter("soru", Some(&filter)).await.unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].page, 2);
}

#[tokio::test]
async fn streamed_answer_is_recorded_once_consumed() {
    let model = ScriptedModel::replying("Kedi bir hayvandır.");
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        model.clone(),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.ingest_pages("hayvan.txt", &[Page::new(1, "Kedi")]).await.unwrap();

    let streaming = pipeline.query_stream("Kedi nedir?").await.unwrap();
    assert_eq!(streaming.outcome, AnswerOutcome::Answered);
    assert_eq!(streaming.sources.len(), 1);

    let fragments: Vec<String> = streaming.fragments.collect().await;
    assert_eq!(fragments, vec!["Kedi ", "bir ", "hayvandır."]);
    assert_eq!(
        pipeline.memory_variables().await,
        Some(MemoryVariables::Turns(vec![ConversationTurn::new(
            "Kedi nedir?",
            "Kedi bir hayvandır."
        )]))
    );
}

#[tokio::test]
async fn dropping_a_stream_early_records_nothing() {
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        ScriptedModel::replying("uzun bir cevap metni"),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.ingest_pages("a.txt", &[Page::new(1, "A belgesi.")]).await.unwrap();

    let mut streaming = pipeline.query_stream("soru").await.unwrap();
    assert_eq!(streaming.fragments.next().await.as_deref(), Some("uzun "));
    drop(streaming);

    assert_eq!(pipeline.memory_variables().await, Some(MemoryVariables::Turns(Vec::new())));
}

#[tokio::test]
async fn mid_stream_failure_ends_with_apology_and_records_nothing() {
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        ScriptedModel::failing_mid_stream(&["Yarım ", "cevap"]),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.ingest_pages("a.txt", &[Page::new(1, "A belgesi.")]).await.unwrap();

    let streaming = pipeline.query_stream("soru").await.unwrap();
    let fragments: Vec<String> = streaming.fragments.collect().await;
    assert_eq!(
        fragments,
        vec![
            "Yarım ".to_string(),
            "cevap".to_string(),
            AnswerMessages::default().generation_failed
        ]
    );
    assert_eq!(pipeline.memory_variables().await, Some(MemoryVariables::Turns(Vec::new())));
}

#[tokio::test]
async fn streaming_fixed_answers_arrive_as_one_fragment() {
    let model = ScriptedModel::replying("cevap");
    let pipeline = pipeline(
        Arc::new(matching_embedder()),
        model.clone(),
        RagConfig::default(),
        MemoryConfig::default(),
    );
    pipeline.switch_collection("pdf_bos").await.unwrap();

    let streaming = pipeline.query_stream("soru").await.unwrap();
    assert_eq!(streaming.outcome, AnswerOutcome::NoInformation);
    let fragments: Vec<String> = streaming.fragments.collect().await;
    assert_eq!(fragments, vec![AnswerMessages::default().no_information]);
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn missing_required_collaborators_fail_the_build() {
    let err = docchat_rag::RagPipeline::builder()
        .embedding_provider(Arc::new(matching_embedder()))
        .build()
        .err()
        .unwrap();
    assert!(matches!(err, RagError::ConfigError(_)));
}
