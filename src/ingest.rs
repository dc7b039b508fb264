//! Ingestion pipeline.
//!
//! Each document runs one ordered sequence inside a single task:
//!
//! ```text
//! parse front matter → chunk → embed batch → insert document → insert chunks
//! ```
//!
//! Chunking and embedding happen before anything is written, so an empty
//! body or a failed embedding call leaves the store untouched. The chunk set
//! is persisted in one transaction; if that fails the document row exists
//! without chunks, counts as unprocessed, and is retried in full by the next
//! ingestion of the same content. Two workers racing on the same content
//! both embed it, but only the first chunk set is stored; the other reports
//! the document as already processed.
//!
//! Directories are ingested in parallel across documents through an
//! [`IngestQueue`](crate::tasks::IngestQueue). One document's failure is
//! recorded in the [`IngestSummary`] and does not stop the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunk::{attach_embeddings, chunk_document, embedding_inputs};
use crate::config::{Config, IngestConfig};
use crate::db;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::frontmatter::load_document;
use crate::models::{Chunk, NewDocument};
use crate::store::{ChunkWrite, DocumentStore};
use crate::tasks::{IngestJob, IngestQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// The document and its chunks were written by this call.
    Ingested,
    /// The same content was already fully stored; nothing was written.
    AlreadyProcessed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub document_id: i64,
    pub chunks: Vec<Chunk>,
    pub status: IngestStatus,
}

/// Totals for a directory ingestion.
#[derive(Debug, Default, Serialize)]
pub struct IngestSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Runs the per-document pipeline against a store.
///
/// With no embedder, chunks are stored without vectors and can be embedded
/// later by [`embed_pending`](crate::backfill::embed_pending).
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    requester_id: i64,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        requester_id: i64,
    ) -> Self {
        Self {
            store,
            embedder,
            requester_id,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Ingest one document, skipping content that is already stored.
    pub async fn ingest_document(&self, doc: &NewDocument) -> Result<IngestOutcome> {
        let hash = doc.hash();

        if self.store.has_been_processed(&hash).await? {
            let existing = self
                .store
                .get_by_hash(&hash)
                .await?
                .ok_or_else(|| Error::NotFound(format!("document {}", hash)))?;
            let chunks = self.store.get_chunks_for_document(existing.id).await?;
            debug!(id = existing.id, %hash, "already processed");
            return Ok(IngestOutcome {
                document_id: existing.id,
                chunks,
                status: IngestStatus::AlreadyProcessed,
            });
        }

        let mut pending = chunk_document(0, &doc.content)?;

        if let Some(embedder) = &self.embedder {
            let inputs = embedding_inputs(&pending);
            let vectors = embedder.embed(&inputs, self.requester_id).await?;
            attach_embeddings(&mut pending, vectors)?;
        }

        let document_id = self.store.insert_document(doc).await?;
        let chunks = match self.store.insert_chunks(document_id, &pending).await? {
            ChunkWrite::Written(chunks) => chunks,
            ChunkWrite::Existing(chunks) => {
                // Another ingestion of the same content finished first.
                debug!(document_id, %hash, "chunks written concurrently");
                return Ok(IngestOutcome {
                    document_id,
                    chunks,
                    status: IngestStatus::AlreadyProcessed,
                });
            }
        };

        info!(
            document_id,
            chunks = chunks.len(),
            file = doc.file_path.as_deref().unwrap_or("-"),
            "ingested document"
        );
        Ok(IngestOutcome {
            document_id,
            chunks,
            status: IngestStatus::Ingested,
        })
    }

    /// Read a Markdown file, parse its front matter, and ingest it.
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestOutcome> {
        let doc = load_document(path)?;
        self.ingest_document(&doc).await
    }
}

/// Ingest every matching file under `root` using `config.workers` workers.
///
/// Without `recursive`, only files directly inside `root` are considered.
/// Paths are matched against `include_globs`/`exclude_globs` relative to
/// `root`.
pub async fn ingest_directory(
    ingestor: &Ingestor,
    root: &Path,
    recursive: bool,
    config: &IngestConfig,
) -> Result<IngestSummary> {
    let files = collect_files(root, recursive, config)?;
    info!(root = %root.display(), files = files.len(), "ingesting directory");

    let queue = IngestQueue::start(ingestor.clone(), config.workers);
    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let handle = queue.submit(IngestJob::File(path.clone())).await?;
        handles.push((path, handle));
    }

    let mut summary = IngestSummary::default();
    for (path, handle) in handles {
        match handle.wait().await {
            Ok(outcome) => match outcome.status {
                IngestStatus::Ingested => summary.processed += 1,
                IngestStatus::AlreadyProcessed => summary.skipped += 1,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to ingest file");
                summary.failed.push((path, e.to_string()));
            }
        }
    }
    queue.shutdown().await;

    Ok(summary)
}

/// CLI entry point for `docent ingest`: a single file or a directory.
pub async fn run_ingest(config: &Config, path: &Path, recursive: bool) -> anyhow::Result<()> {
    let store = Arc::new(db::open_store(config).await?);
    let embedder = if config.embedding.is_enabled() {
        Some(create_embedder(&config.embedding)?)
    } else {
        None
    };
    let embedding_enabled = embedder.is_some();
    let ingestor = Ingestor::new(store.clone(), embedder, config.ingest.requester_id);

    if path.is_file() {
        let outcome = ingestor
            .ingest_file(path)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        println!("ingest {}", path.display());
        println!("  document: {}", outcome.document_id);
        println!("  chunks: {}", outcome.chunks.len());
        if outcome.status == IngestStatus::AlreadyProcessed {
            println!("  already processed, nothing written");
        }
    } else {
        let summary = ingest_directory(&ingestor, path, recursive, &config.ingest).await?;
        println!("ingest {}", path.display());
        println!("  processed: {}", summary.processed);
        println!("  skipped: {}", summary.skipped);
        println!("  failed: {}", summary.failed.len());
        for (file, error) in &summary.failed {
            println!("    {}: {}", file.display(), error);
        }
    }
    if !embedding_enabled {
        println!("  embeddings: pending (provider disabled; run `docent embed pending` later)");
    }
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// Files under `root` that pass the include/exclude globs, sorted by path.
pub fn collect_files(root: &Path, recursive: bool, config: &IngestConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::NotFound(format!("directory {}", root.display())));
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut walker = WalkDir::new(root);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();

        if exclude_set.is_match(&*rel_str) || !include_set.is_match(&*rel_str) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid glob set: {}", e)))
}
