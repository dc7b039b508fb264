//! Document and chunk storage.
//!
//! The [`DocumentStore`] trait covers every persistence operation the
//! ingestion and retrieval pipelines need. Two backends implement it:
//!
//! | Backend | Module | Vector index |
//! |---------|--------|--------------|
//! | SQLite (sqlx, WAL) | [`sqlite`] | `chunk_vectors` table ([`sqlite::SqliteVectorIndex`]) |
//! | In-memory | [`memory`] | [`MemoryIndex`](crate::vector::MemoryIndex) |
//!
//! # Idempotency
//!
//! Documents are keyed by the SHA-256 of their body. Inserting a document
//! whose hash is already stored returns the existing id and writes nothing.
//! A document only counts as *processed* once it has at least one chunk, so a
//! run that stored the document row but failed before its chunks landed is
//! retried in full on the next ingestion.
//!
//! A document gets exactly one chunk set. When two ingestions of the same
//! content race, the second [`DocumentStore::insert_chunks`] finds the
//! first one's chunks and returns them as [`ChunkWrite::Existing`] without
//! writing.
//!
//! # Zero results
//!
//! Collection accessors return an empty `Vec` when nothing matches. Single
//! lookups return `Ok(None)`; callers that need the row turn that into
//! [`Error::NotFound`](crate::error::Error::NotFound).

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::hash::ContentHash;
use crate::models::{Chunk, Document, NewChunk, NewDocument, StoreStats};

/// What [`DocumentStore::insert_chunks`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkWrite {
    /// The chunk set was written by this call.
    Written(Vec<Chunk>),
    /// The document already had chunks; these are them, and nothing was
    /// written.
    Existing(Vec<Chunk>),
}

impl ChunkWrite {
    pub fn chunks(&self) -> &[Chunk] {
        match self {
            ChunkWrite::Written(chunks) | ChunkWrite::Existing(chunks) => chunks,
        }
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        match self {
            ChunkWrite::Written(chunks) | ChunkWrite::Existing(chunks) => chunks,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, ChunkWrite::Written(_))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document, or return the id of the stored document with the
    /// same content hash.
    async fn insert_document(&self, doc: &NewDocument) -> Result<i64>;

    /// True if a document with `hash` exists and has at least one chunk.
    async fn has_been_processed(&self, hash: &ContentHash) -> Result<bool>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Document>>;

    async fn get_by_hash(&self, hash: &ContentHash) -> Result<Option<Document>>;

    /// All documents, by id.
    async fn get_all_documents(&self) -> Result<Vec<Document>>;

    /// A document's chunks, in insertion order.
    async fn get_chunks_for_document(&self, document_id: i64) -> Result<Vec<Chunk>>;

    /// All chunks, by id.
    async fn get_all_chunks(&self) -> Result<Vec<Chunk>>;

    /// Chunks for `ids`, in the order given. Unknown ids are skipped.
    async fn get_chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>>;

    /// Persist one chunk and, if it carries an embedding, its vector.
    ///
    /// Both writes succeed or neither does. A vector of the wrong
    /// dimensionality is rejected before anything is written.
    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<Chunk>;

    /// Persist a document's whole chunk set atomically, with vectors.
    ///
    /// Each chunk is stored under `document_id` regardless of the id it was
    /// built with. If the document already has chunks, nothing is written
    /// and the stored set comes back as [`ChunkWrite::Existing`]. The check
    /// and the write are one atomic step. On error nothing is written,
    /// leaving the document unprocessed.
    async fn insert_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<ChunkWrite>;

    /// Chunks that have no vector yet, by id.
    async fn chunks_missing_embeddings(&self, limit: Option<usize>) -> Result<Vec<Chunk>>;

    async fn stats(&self) -> Result<StoreStats>;
}
