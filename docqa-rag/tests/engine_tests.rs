//! End-to-end tests for ingestion, question answering and reset.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    BagOfWordsEmbedder, CannedGenerator, FailingEmbedder, FailingGenerator, SlowEmbedder,
    SlowGenerator, engine_with, minimal_pdf, text_file,
};
use docqa_rag::{
    RESET_MESSAGE, RagConfig, RagError, RetrievalEngine, UploadedFile, ValidationError,
    VectorStore,
};
use docqa_telemetry::{InMemoryTraceLayer, SharedTraceStorage};
use tracing_subscriber::layer::SubscriberExt;

struct Fixture {
    dir: tempfile::TempDir,
    embedder: Arc<BagOfWordsEmbedder>,
    generator: Arc<CannedGenerator>,
    engine: RetrievalEngine,
}

fn fixture_with(config: RagConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(BagOfWordsEmbedder::new());
    let generator = Arc::new(CannedGenerator::new("blue"));
    let engine = engine_with(dir.path(), config, embedder.clone(), generator.clone());
    Fixture { dir, embedder, generator, engine }
}

fn fixture() -> Fixture {
    fixture_with(RagConfig::default())
}

fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}

#[tokio::test]
async fn answers_from_ingested_document() {
    let f = fixture();

    let report = f.engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();
    assert_eq!(report.chunks_ingested, 1);
    assert_eq!(report.files_ingested, 1);
    assert_eq!(report.message(), "Ingested 1 chunks and saved to the vector store.");

    let result = f.engine.retrieve("What color is the sky?", None).await.unwrap();
    assert_eq!(result.answer, "blue");
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].content, "The sky is blue.");
    assert_eq!(result.sources[0].metadata["source"], "sky.txt");
    assert_eq!(result.sources[0].metadata["chunk_index"], "0");

    let prompts = f.generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("The sky is blue."));
    assert!(prompts[0].contains("Question: What color is the sky?"));
}

#[tokio::test]
async fn query_before_ingest_reports_missing_store_first() {
    let f = fixture();

    for (question, k) in [("What?", None), ("", None), ("  ", Some(0)), (words(80).as_str(), None)] {
        let err = f.engine.retrieve(question, k).await.unwrap_err();
        assert!(matches!(err, RagError::StoreNotInitialized), "got {err:?}");
        assert_eq!(err.to_string(), "No vector store found. Please ingest documents first.");
    }
    assert_eq!(f.embedder.calls(), 0);
}

#[tokio::test]
async fn validation_runs_in_order_without_side_effects() {
    let f = fixture();
    f.engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();
    let calls_after_ingest = f.embedder.calls();

    let err = f.engine.retrieve(" \t\n", Some(0)).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(ValidationError::EmptyQuestion)));
    assert_eq!(err.to_string(), "Question cannot be empty.");

    let err = f.engine.retrieve(&words(51), Some(0)).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::Validation(ValidationError::QuestionTooLong { words: 51, max: 50 })
    ));
    assert_eq!(err.to_string(), "Question is too long (51 words). Please limit to 50 words.");

    let err = f.engine.retrieve("Is the sky blue?", Some(0)).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(ValidationError::InvalidTopK(0))));

    assert_eq!(f.embedder.calls(), calls_after_ingest);
    assert!(f.generator.prompts().is_empty());
}

#[tokio::test]
async fn fifty_word_question_is_accepted() {
    let f = fixture();
    f.engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();

    let result = f.engine.retrieve(&words(50), None).await.unwrap();
    assert_eq!(result.answer, "blue");
}

#[tokio::test]
async fn k_larger_than_store_returns_everything_best_first() {
    let f = fixture();
    f.engine
        .ingest(
            vec![
                text_file("grass.txt", "Grass is green in spring."),
                text_file("sky.txt", "The sky is blue."),
                text_file("sun.txt", "The sun is a star."),
            ],
            false,
        )
        .await
        .unwrap();

    let result = f.engine.retrieve("Is the sky blue?", Some(10)).await.unwrap();
    assert_eq!(result.sources.len(), 3);
    assert_eq!(result.sources[0].content, "The sky is blue.");
}

#[tokio::test]
async fn sources_include_chunks_dropped_from_prompt() {
    let config = RagConfig::builder().context_window(120).build().unwrap();
    let f = fixture_with(config);
    f.engine
        .ingest(
            vec![
                text_file("sky.txt", &"The sky is blue. ".repeat(17)),
                text_file("grass.txt", &"Grass is green in spring. ".repeat(11)),
                text_file("sun.txt", &"The sun is a star. ".repeat(15)),
            ],
            false,
        )
        .await
        .unwrap();

    let result = f.engine.retrieve("Is the sky blue?", Some(3)).await.unwrap();
    assert_eq!(result.sources.len(), 3);
    assert!(result.sources[0].content.starts_with("The sky is blue."));

    let prompt = &f.generator.prompts()[0];
    assert!(prompt.contains("The sky is blue."));
    assert!(!prompt.contains("Grass"));
    assert!(!prompt.contains("star"));
    assert!(docqa_rag::estimate_tokens(prompt) <= 120);
}

#[tokio::test]
async fn ingest_appends_unless_replace() {
    let f = fixture();
    f.engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();
    f.engine.ingest(vec![text_file("sun.txt", "The sun is a star.")], false).await.unwrap();
    assert_eq!(f.engine.store_len().await.unwrap(), Some(2));

    f.engine.ingest(vec![text_file("grass.txt", "Grass is green.")], true).await.unwrap();
    assert_eq!(f.engine.store_len().await.unwrap(), Some(1));

    let result = f.engine.retrieve("Is the sky blue?", Some(5)).await.unwrap();
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].content, "Grass is green.");
}

#[tokio::test]
async fn unsupported_files_are_skipped_and_reported() {
    let f = fixture();
    let report = f
        .engine
        .ingest(
            vec![
                UploadedFile::new("notes.docx", b"PK\x03\x04".to_vec()),
                text_file("sky.txt", "The sky is blue."),
                text_file("README", "no extension"),
            ],
            false,
        )
        .await
        .unwrap();

    assert_eq!(report.files_ingested, 1);
    assert_eq!(report.chunks_ingested, 1);
    assert_eq!(report.skipped_files, vec!["notes.docx", "README"]);
    assert!(report.message().contains("Skipped 2 unsupported file(s): notes.docx, README."));
}

#[tokio::test]
async fn ingest_without_chunks_creates_no_store() {
    let f = fixture();
    let report = f
        .engine
        .ingest(
            vec![UploadedFile::new("slides.pptx", vec![0u8; 16]), text_file("blank.txt", " \n\n ")],
            false,
        )
        .await
        .unwrap();

    assert_eq!(report.chunks_ingested, 0);
    assert_eq!(f.engine.store_len().await.unwrap(), None);
    assert!(!f.engine.persist_directory().exists());
    assert!(matches!(
        f.engine.retrieve("Anything?", None).await,
        Err(RagError::StoreNotInitialized)
    ));
}

#[tokio::test]
async fn answers_from_ingested_pdf() {
    let f = fixture();
    let pdf = UploadedFile::new("sky.pdf", minimal_pdf("The sky is blue."));

    let report = f.engine.ingest(vec![pdf], false).await.unwrap();
    assert_eq!(report.files_ingested, 1);
    assert_eq!(report.chunks_ingested, 1);

    let result = f.engine.retrieve("What color is the sky?", None).await.unwrap();
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources[0].content, "The sky is blue.");
    assert_eq!(result.sources[0].metadata["source"], "sky.pdf");
    assert_eq!(result.sources[0].metadata["file_type"], "pdf");
    assert!(f.generator.prompts()[0].contains("The sky is blue."));
}

#[tokio::test]
async fn unreadable_pdf_is_an_extraction_error() {
    let f = fixture();
    let err = f
        .engine
        .ingest(vec![UploadedFile::new("broken.pdf", b"definitely not a pdf".to_vec())], false)
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Extraction { ref file, .. } if file == "broken.pdf"));
    assert_eq!(f.engine.store_len().await.unwrap(), None);
}

#[tokio::test]
async fn reset_discards_store_and_is_idempotent() {
    let f = fixture();
    f.engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();
    assert!(f.engine.persist_directory().exists());

    assert_eq!(f.engine.reset().await.unwrap(), RESET_MESSAGE);
    assert_eq!(f.engine.store_len().await.unwrap(), None);
    assert!(!f.engine.persist_directory().exists());
    assert!(matches!(
        f.engine.retrieve("Is the sky blue?", None).await,
        Err(RagError::StoreNotInitialized)
    ));

    assert_eq!(f.engine.reset().await.unwrap(), RESET_MESSAGE);

    f.engine.ingest(vec![text_file("sun.txt", "The sun is a star.")], false).await.unwrap();
    assert_eq!(f.engine.store_len().await.unwrap(), Some(1));
}

#[tokio::test]
async fn persisted_store_is_found_by_a_new_engine() {
    let f = fixture();
    f.engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();
    drop(f.engine);

    let generator = Arc::new(CannedGenerator::new("still blue"));
    let engine =
        engine_with(f.dir.path(), RagConfig::default(), f.embedder.clone(), generator.clone());

    let result = engine.retrieve("What color is the sky?", None).await.unwrap();
    assert_eq!(result.answer, "still blue");
    assert_eq!(result.sources[0].content, "The sky is blue.");

    engine.ingest(vec![text_file("sun.txt", "The sun is a star.")], false).await.unwrap();
    assert_eq!(engine.store_len().await.unwrap(), Some(2));
}

#[tokio::test]
async fn slow_generation_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let config =
        RagConfig::builder().generation_timeout(Duration::from_millis(50)).build().unwrap();
    let engine = engine_with(
        dir.path(),
        config,
        Arc::new(BagOfWordsEmbedder::new()),
        Arc::new(SlowGenerator(Duration::from_secs(5))),
    );
    engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();

    let err = engine.retrieve("Is the sky blue?", None).await.unwrap_err();
    assert!(matches!(err, RagError::GenerationTimeout { after } if after == Duration::from_millis(50)));

    // The store lock was released; mutations still go through.
    assert_eq!(engine.reset().await.unwrap(), RESET_MESSAGE);
}

#[tokio::test]
async fn backend_failures_surface_as_typed_errors() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(
        dir.path(),
        RagConfig::default(),
        Arc::new(FailingEmbedder),
        Arc::new(FailingGenerator),
    );
    let err = engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }));
    assert_eq!(engine.store_len().await.unwrap(), None);

    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(
        dir.path(),
        RagConfig::default(),
        Arc::new(BagOfWordsEmbedder::new()),
        Arc::new(FailingGenerator),
    );
    engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();
    let err = engine.retrieve("Is the sky blue?", None).await.unwrap_err();
    assert!(matches!(err, RagError::Generation { .. }));
}

#[tokio::test]
async fn concurrent_queries_share_the_store() {
    let f = fixture();
    f.engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();

    let engine = Arc::new(f.engine);
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.retrieve("Is the sky blue?", None).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.sources[0].content, "The sky is blue.");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queries_never_observe_a_partial_ingest_or_reset() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine_with(
        dir.path(),
        RagConfig::default(),
        Arc::new(SlowEmbedder::new(Duration::from_millis(200))),
        Arc::new(CannedGenerator::new("blue")),
    ));
    let files = || {
        vec![
            text_file("sky.txt", "The sky is blue."),
            text_file("sun.txt", "The sun is a star."),
            text_file("grass.txt", "Grass is green."),
        ]
    };

    for round in 0..2 {
        let ingest = {
            let engine = engine.clone();
            let files = files();
            tokio::spawn(async move { engine.ingest(files, true).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut queries = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            let query = async move { engine.retrieve("Is the sky blue?", Some(10)).await };
            queries.push(tokio::spawn(query));
        }
        let reset = (round == 0).then(|| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.reset().await })
        });

        assert_eq!(ingest.await.unwrap().unwrap().chunks_ingested, 3);
        if let Some(reset) = reset {
            assert_eq!(reset.await.unwrap().unwrap(), RESET_MESSAGE);
        }
        for query in queries {
            match query.await.unwrap() {
                Ok(result) => assert_eq!(result.sources.len(), 3),
                Err(err) => assert!(matches!(err, RagError::StoreNotInitialized), "got {err:?}"),
            }
        }

        let in_memory = engine.store_len().await.unwrap();
        let on_disk = match VectorStore::open(engine.persist_directory()).await.unwrap() {
            Some(store) => Some(store.len().await),
            None => None,
        };
        assert_eq!(in_memory, on_disk);
        let expected = if round == 0 { None } else { Some(3) };
        assert_eq!(in_memory, expected);
    }
}

#[tokio::test]
async fn operations_emit_request_scoped_spans() {
    let storage = Arc::new(SharedTraceStorage::new());
    let subscriber =
        tracing_subscriber::registry().with(InMemoryTraceLayer::new(storage.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let f = fixture();
    f.engine.ingest(vec![text_file("sky.txt", "The sky is blue.")], false).await.unwrap();
    f.engine.retrieve("Is the sky blue?", Some(2)).await.unwrap();
    f.engine.reset().await.unwrap();

    let ingest = storage.spans_named("engine.ingest");
    assert_eq!(ingest.len(), 1);
    assert_eq!(ingest[0].attributes["file_count"], serde_json::json!(1));
    assert_eq!(ingest[0].attributes["replace"], serde_json::json!(false));

    assert_eq!(storage.spans_named("engine.retrieve").len(), 1);
    assert_eq!(storage.spans_named("engine.reset").len(), 1);
    assert_eq!(storage.request_ids().len(), 3);
}
