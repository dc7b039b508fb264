//! In-memory [`DocumentStore`] for tests and embedding in other programs.
//!
//! Rows live in `Vec`s behind `std::sync::RwLock`; ids are assigned
//! sequentially from 1. Vectors go to a shared [`MemoryIndex`]. No lock is
//! held across an `.await`.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::models::{Chunk, Document, NewChunk, NewDocument, StoreStats};
use crate::vector::{check_dims, MemoryIndex, VectorIndex};

use super::{ChunkWrite, DocumentStore};

pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
    chunks: RwLock<Vec<Chunk>>,
    index: Arc<MemoryIndex>,
}

impl InMemoryStore {
    pub fn new(dims: usize) -> Self {
        Self {
            docs: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
            index: Arc::new(MemoryIndex::new(dims)),
        }
    }

    /// The vector index chunk embeddings are written to.
    pub fn index(&self) -> Arc<MemoryIndex> {
        Arc::clone(&self.index)
    }

    fn document_exists(&self, id: i64) -> bool {
        self.docs.read().unwrap().iter().any(|d| d.id == id)
    }

    /// Validate a batch before any write, so a failure leaves no trace.
    fn precheck(&self, document_id: i64, chunks: &[NewChunk]) -> Result<()> {
        if !self.document_exists(document_id) {
            return Err(Error::NotFound(format!("document {}", document_id)));
        }
        for chunk in chunks {
            if let Some(vector) = &chunk.embedding {
                check_dims(self.index.dims(), vector)?;
            }
        }
        Ok(())
    }

    /// Append chunks under a held write lock.
    fn write_chunks(
        &self,
        stored: &mut Vec<Chunk>,
        document_id: i64,
        chunks: &[NewChunk],
    ) -> Vec<Chunk> {
        let mut written = Vec::with_capacity(chunks.len());
        for new in chunks {
            let chunk = Chunk {
                id: stored.len() as i64 + 1,
                document_id,
                content: new.content.clone(),
                content_hash: new.content_hash,
            };
            if let Some(vector) = &new.embedding {
                self.index.put(chunk.id, vector.clone());
            }
            stored.push(chunk.clone());
            written.push(chunk);
        }
        written
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, doc: &NewDocument) -> Result<i64> {
        if doc.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        let hash = doc.hash();
        let mut docs = self.docs.write().unwrap();
        if let Some(existing) = docs.iter().find(|d| d.content_hash == hash) {
            return Ok(existing.id);
        }
        let id = docs.len() as i64 + 1;
        docs.push(Document {
            id,
            title: doc.title.clone(),
            author: doc.author.clone(),
            publication_date: doc.publication_date.clone(),
            url: doc.url.clone(),
            file_path: doc.file_path.clone(),
            content: doc.content.clone(),
            content_hash: hash,
        });
        Ok(id)
    }

    async fn has_been_processed(&self, hash: &ContentHash) -> Result<bool> {
        let doc_id = match self
            .docs
            .read()
            .unwrap()
            .iter()
            .find(|d| d.content_hash == *hash)
        {
            Some(d) => d.id,
            None => return Ok(false),
        };
        Ok(self
            .chunks
            .read()
            .unwrap()
            .iter()
            .any(|c| c.document_id == doc_id))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Document>> {
        Ok(self.docs.read().unwrap().iter().find(|d| d.id == id).cloned())
    }

    async fn get_by_hash(&self, hash: &ContentHash) -> Result<Option<Document>> {
        Ok(self
            .docs
            .read()
            .unwrap()
            .iter()
            .find(|d| d.content_hash == *hash)
            .cloned())
    }

    async fn get_all_documents(&self) -> Result<Vec<Document>> {
        Ok(self.docs.read().unwrap().clone())
    }

    async fn get_chunks_for_document(&self, document_id: i64) -> Result<Vec<Chunk>> {
        Ok(self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn get_all_chunks(&self) -> Result<Vec<Chunk>> {
        Ok(self.chunks.read().unwrap().clone())
    }

    async fn get_chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| chunks.iter().find(|c| c.id == *id).cloned())
            .collect())
    }

    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<Chunk> {
        self.precheck(chunk.document_id, std::slice::from_ref(chunk))?;
        let mut stored = self.chunks.write().unwrap();
        let mut written =
            self.write_chunks(&mut stored, chunk.document_id, std::slice::from_ref(chunk));
        Ok(written.remove(0))
    }

    async fn insert_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<ChunkWrite> {
        self.precheck(document_id, chunks)?;
        let mut stored = self.chunks.write().unwrap();
        let existing: Vec<Chunk> = stored
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        if !existing.is_empty() {
            return Ok(ChunkWrite::Existing(existing));
        }
        Ok(ChunkWrite::Written(self.write_chunks(
            &mut stored,
            document_id,
            chunks,
        )))
    }

    async fn chunks_missing_embeddings(&self, limit: Option<usize>) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read().unwrap();
        Ok(chunks
            .iter()
            .filter(|c| !self.index.contains(c.id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let chunks = self.chunks.read().unwrap();
        let embedded = chunks.iter().filter(|c| self.index.contains(c.id)).count();
        Ok(StoreStats {
            documents: self.docs.read().unwrap().len() as i64,
            chunks: chunks.len() as i64,
            embedded_chunks: embedded as i64,
        })
    }
}
