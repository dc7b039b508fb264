//! End-to-end pipeline tests against an on-disk SQLite store with
//! deterministic providers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docent::backfill::embed_pending;
use docent::completion::CompletionProvider;
use docent::config::IngestConfig;
use docent::db;
use docent::embedding::EmbeddingProvider;
use docent::ingest::{ingest_directory, IngestStatus, Ingestor};
use docent::models::{NewDocument, StoreStats};
use docent::retrieval::Orchestrator;
use docent::store::sqlite::SqliteStore;
use docent::store::DocumentStore;
use docent::vector::VectorIndex;
use docent::{Error, Result};
use tempfile::TempDir;

const DIMS: usize = 4;

/// Buckets text by keyword so that related texts share a direction.
struct TopicEmbedder {
    fail: AtomicBool,
}

impl TopicEmbedder {
    fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    fn vector(text: &str) -> Vec<f32> {
        let t = text.to_lowercase();
        vec![
            t.contains("rust") as u8 as f32,
            t.contains("garden") as u8 as f32,
            t.contains("music") as u8 as f32,
            0.1,
        ]
    }
}

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    fn model_name(&self) -> &str {
        "topic"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String], _requester: i64) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::EmbeddingProvider("503 from provider".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// [`TopicEmbedder`] behind a fixed delay, so parallel workers overlap.
struct SlowTopicEmbedder;

#[async_trait]
impl EmbeddingProvider for SlowTopicEmbedder {
    fn model_name(&self) -> &str {
        "slow-topic"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String], _requester: i64) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        Ok(texts.iter().map(|t| TopicEmbedder::vector(t)).collect())
    }
}

#[derive(Default)]
struct EchoCompleter {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionProvider for EchoCompleter {
    fn model_name(&self) -> &str {
        "echo"
    }
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(format!("answered from {} bytes of context", prompt.len()))
    }
}

async fn open_store(tmp: &TempDir) -> Arc<SqliteStore> {
    let mut config = docent::config::Config::minimal(tmp.path().join("data/docent.sqlite"));
    config.embedding.dims = DIMS;
    Arc::new(db::open_store(&config).await.unwrap())
}

fn ingestor(store: &Arc<SqliteStore>, embedder: Arc<TopicEmbedder>) -> Ingestor {
    Ingestor::new(
        store.clone(),
        Some(embedder as Arc<dyn EmbeddingProvider>),
        1,
    )
}

fn titled(title: &str, body: &str) -> NewDocument {
    let mut doc = NewDocument::from_content(body);
    doc.title = Some(title.to_string());
    doc
}

#[tokio::test]
async fn test_ingest_twice_stores_once() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let ingestor = ingestor(&store, Arc::new(TopicEmbedder::new()));

    let doc = titled("Rust", "Rust is fast.\n\nRust is safe.");
    let first = ingestor.ingest_document(&doc).await.unwrap();
    let second = ingestor.ingest_document(&doc).await.unwrap();

    assert_eq!(first.status, IngestStatus::Ingested);
    assert_eq!(second.status, IngestStatus::AlreadyProcessed);
    assert_eq!(first.document_id, second.document_id);

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.embedded_chunks, 3);
}

#[tokio::test]
async fn test_ask_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let embedder = Arc::new(TopicEmbedder::new());
    let ingestor = ingestor(&store, embedder.clone());

    let rust = ingestor
        .ingest_document(&titled(
            "Rust Notes",
            "Rust has ownership.\n\nRust has lifetimes.",
        ))
        .await
        .unwrap();

    let completer = Arc::new(EchoCompleter::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        store.index(),
        embedder,
        completer.clone(),
        5,
    );

    let answer = orchestrator
        .answer(1, "What does Rust have?", "")
        .await
        .unwrap();

    assert!(!answer.response.is_empty());
    assert_eq!(answer.chunks.len(), 3);
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].id, rust.document_id);
    assert_eq!(answer.sources[0].title.as_deref(), Some("Rust Notes"));

    let prompts = completer.prompts.lock().unwrap();
    assert!(prompts[0].starts_with("This is our conversation history: \n\n"));
    assert!(prompts[0].contains(&format!("Document ID: {}\n", rust.document_id)));
}

#[tokio::test]
async fn test_ranking_prefers_related_document() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let embedder = Arc::new(TopicEmbedder::new());
    let ingestor = ingestor(&store, embedder.clone());

    ingestor
        .ingest_document(&titled("Garden", "The garden needs water."))
        .await
        .unwrap();
    let music = ingestor
        .ingest_document(&titled("Music", "Music theory basics."))
        .await
        .unwrap();

    let orchestrator = Orchestrator::new(
        store.clone(),
        store.index(),
        embedder,
        Arc::new(EchoCompleter::default()),
        5,
    );
    let answer = orchestrator.answer(1, "music please", "").await.unwrap();
    assert_eq!(answer.chunks[0].document_id, music.document_id);
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0].id, music.document_id);
}

#[tokio::test]
async fn test_embedding_outage_leaves_document_retryable() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let embedder = Arc::new(TopicEmbedder::new());
    let ingestor = ingestor(&store, embedder.clone());
    let doc = titled("Garden", "Garden beds.\n\nGarden paths.");

    embedder.fail.store(true, Ordering::SeqCst);
    let err = ingestor.ingest_document(&doc).await.unwrap_err();
    assert!(matches!(err, Error::EmbeddingProvider(_)));
    assert!(!store.has_been_processed(&doc.hash()).await.unwrap());
    assert_eq!(store.stats().await.unwrap().chunks, 0);

    embedder.fail.store(false, Ordering::SeqCst);
    let outcome = ingestor.ingest_document(&doc).await.unwrap();
    assert_eq!(outcome.status, IngestStatus::Ingested);
    assert_eq!(store.stats().await.unwrap().embedded_chunks, 3);
}

#[tokio::test]
async fn test_document_without_chunks_is_reprocessed() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let doc = titled("Orphan", "Stored before a crash.");

    // A previous run wrote the row and died before its chunks.
    let orphan_id = store.insert_document(&doc).await.unwrap();
    assert!(!store.has_been_processed(&doc.hash()).await.unwrap());

    let ingestor = ingestor(&store, Arc::new(TopicEmbedder::new()));
    let outcome = ingestor.ingest_document(&doc).await.unwrap();
    assert_eq!(outcome.status, IngestStatus::Ingested);
    assert_eq!(outcome.document_id, orphan_id);
    assert_eq!(store.get_all_documents().await.unwrap().len(), 1);
    assert!(store.has_been_processed(&doc.hash()).await.unwrap());
}

#[tokio::test]
async fn test_empty_document_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let ingestor = ingestor(&store, Arc::new(TopicEmbedder::new()));

    let err = ingestor
        .ingest_document(&NewDocument::from_content(""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyContent));
    assert_eq!(store.stats().await.unwrap(), StoreStats::default());
}

#[tokio::test]
async fn test_directory_ingest_then_backfill() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let content = tmp.path().join("content");
    std::fs::create_dir_all(content.join("posts")).unwrap();
    std::fs::write(
        content.join("posts/rust.md"),
        "---\ntitle: Rust\n---\nRust tips.\n\nMore Rust tips.",
    )
    .unwrap();
    std::fs::write(content.join("garden.md"), "Garden log.").unwrap();
    std::fs::write(content.join("blank.md"), "---\ntitle: Blank\n---\n\n").unwrap();

    // No embedder: chunks land without vectors.
    let ingestor = Ingestor::new(store.clone(), None, 1);
    let summary = ingest_directory(&ingestor, &content, true, &IngestConfig::default())
        .await
        .unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].1.contains("empty content"));

    let index = store.index();
    assert!(index.is_empty().await.unwrap());
    assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 5).await.unwrap().is_empty());

    let report = embed_pending(
        store.as_ref(),
        index.as_ref(),
        &TopicEmbedder::new(),
        2,
        None,
        1,
    )
    .await
    .unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.embedded, 5);

    let hits = index.search(&TopicEmbedder::vector("rust"), 1).await.unwrap();
    let top = store.get_chunks_by_ids(&[hits[0].chunk_id]).await.unwrap();
    assert!(top[0].content.contains("Rust"));
}

#[tokio::test]
async fn test_search_with_wrong_dimensions_rejected() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let ingestor = ingestor(&store, Arc::new(TopicEmbedder::new()));
    ingestor
        .ingest_document(&NewDocument::from_content("Rust."))
        .await
        .unwrap();

    let err = store.index().search(&[1.0, 0.0], 5).await.unwrap_err();
    assert!(matches!(
        err,
        Error::EmbeddingDimensionMismatch {
            expected: 4,
            actual: 2
        }
    ));
}

#[tokio::test]
async fn test_parallel_directory_ingest_dedups_same_body() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let content = tmp.path().join("content");
    std::fs::create_dir_all(&content).unwrap();
    for name in ["a", "b", "c"] {
        std::fs::write(
            content.join(format!("{}.md", name)),
            format!("---\ntitle: Copy {}\n---\nGarden beds.\n\nGarden paths.", name),
        )
        .unwrap();
    }
    std::fs::write(content.join("rust.md"), "Rust tips.").unwrap();

    let ingestor = Ingestor::new(
        store.clone(),
        Some(Arc::new(SlowTopicEmbedder) as Arc<dyn EmbeddingProvider>),
        1,
    );
    let config = IngestConfig {
        workers: 4,
        ..IngestConfig::default()
    };
    let summary = ingest_directory(&ingestor, &content, false, &config)
        .await
        .unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 2);
    assert!(summary.failed.is_empty());

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, 5);
    assert_eq!(stats.embedded_chunks, 5);
}
