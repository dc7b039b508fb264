//! Embedding backfill for chunks stored without vectors.
//!
//! Chunks written while no embedding provider was configured (or by an older
//! run) have no row in the vector index. [`embed_pending`] finds them, embeds
//! them in batches, and writes the vectors. A failed batch is logged and
//! counted; the remaining batches still run.

use anyhow::bail;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::Result;
use crate::store::DocumentStore;
use crate::vector::VectorIndex;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub total: usize,
    pub embedded: usize,
    pub failed: usize,
}

pub async fn embed_pending(
    store: &dyn DocumentStore,
    index: &dyn VectorIndex,
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
    limit: Option<usize>,
    requester: i64,
) -> Result<BackfillReport> {
    let pending = store.chunks_missing_embeddings(limit).await?;
    let mut report = BackfillReport {
        total: pending.len(),
        ..Default::default()
    };

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

        let vectors = match embedder.embed(&texts, requester).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(error = %e, batch = batch.len(), "embedding batch failed");
                report.failed += batch.len();
                continue;
            }
        };

        if vectors.len() != batch.len() {
            warn!(
                expected = batch.len(),
                received = vectors.len(),
                "embedding batch misaligned"
            );
            report.failed += batch.len();
            continue;
        }

        for (chunk, vector) in batch.iter().zip(vectors) {
            match index.add(chunk.id, &vector).await {
                Ok(()) => report.embedded += 1,
                Err(e) => {
                    warn!(chunk_id = chunk.id, error = %e, "failed to store vector");
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        total = report.total,
        embedded = report.embedded,
        failed = report.failed,
        "embed pending finished"
    );
    Ok(report)
}

/// CLI entry point for `docent embed pending`.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size: Option<usize>,
) -> anyhow::Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = create_embedder(&config.embedding)?;
    let store = db::open_store(config).await?;
    let index = store.index();
    let batch_size = batch_size.unwrap_or(config.embedding.batch_size);

    let report = embed_pending(
        &store,
        index.as_ref(),
        embedder.as_ref(),
        batch_size,
        limit,
        config.ingest.requester_id,
    )
    .await?;

    println!("embed pending");
    if report.total == 0 {
        println!("  all chunks up to date");
    } else {
        println!("  total pending: {}", report.total);
        println!("  embedded: {}", report.embedded);
        println!("  failed: {}", report.failed);
    }

    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_document;
    use crate::error::Error;
    use crate::models::NewDocument;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;

    /// Fails any batch containing a text that starts with "bad".
    struct PickyEmbedder;

    #[async_trait]
    impl EmbeddingProvider for PickyEmbedder {
        fn model_name(&self) -> &str {
            "picky"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String], _requester: i64) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.starts_with("bad")) {
                return Err(Error::EmbeddingProvider("rejected".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    async fn seed(store: &InMemoryStore, body: &str) {
        let id = store
            .insert_document(&NewDocument::from_content(body))
            .await
            .unwrap();
        let chunks = chunk_document(id, body).unwrap();
        store.insert_chunks(id, &chunks).await.unwrap();
    }

    #[tokio::test]
    async fn test_embeds_all_pending_chunks() {
        let store = InMemoryStore::new(2);
        seed(&store, "one\n\ntwo").await;
        let index = store.index();

        let report = embed_pending(&store, index.as_ref(), &PickyEmbedder, 2, None, 1)
            .await
            .unwrap();
        assert_eq!(report, BackfillReport { total: 3, embedded: 3, failed: 0 });
        assert!(store.chunks_missing_embeddings(None).await.unwrap().is_empty());

        let again = embed_pending(&store, index.as_ref(), &PickyEmbedder, 2, None, 1)
            .await
            .unwrap();
        assert_eq!(again.total, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_the_rest() {
        let store = InMemoryStore::new(2);
        seed(&store, "bad").await;
        seed(&store, "good").await;
        let index = store.index();

        let report = embed_pending(&store, index.as_ref(), &PickyEmbedder, 2, None, 1)
            .await
            .unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.failed, 2);
        assert_eq!(report.embedded, 2);
        assert_eq!(store.chunks_missing_embeddings(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_limit_caps_the_run() {
        let store = InMemoryStore::new(2);
        seed(&store, "a\n\nb\n\nc").await;
        let index = store.index();
        let report = embed_pending(&store, index.as_ref(), &PickyEmbedder, 10, Some(2), 1)
            .await
            .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(store.chunks_missing_embeddings(None).await.unwrap().len(), 2);
    }
}
