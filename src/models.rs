//! Core data models: documents and the chunks derived from them.
//!
//! `New*` types are what the ingestion pipeline builds before anything is
//! persisted; the plain types are rows as the store returns them.

use serde::Serialize;

use crate::hash::{content_hash, ContentHash};

/// A document that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDocument {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publication_date: Option<String>,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub content: String,
    /// Precomputed digest of `content`; computed on insert when absent.
    pub content_hash: Option<ContentHash>,
}

impl NewDocument {
    /// A document with body text only.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// The digest of the body, computing it if it was not supplied.
    pub fn hash(&self) -> ContentHash {
        self.content_hash
            .unwrap_or_else(|| content_hash(&self.content))
    }
}

/// A persisted document row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: i64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publication_date: Option<String>,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub content: String,
    pub content_hash: ContentHash,
}

impl Document {
    /// Title if present, else the file path, else `document <id>`.
    pub fn display_name(&self) -> String {
        self.title
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.file_path.clone())
            .unwrap_or_else(|| format!("document {}", self.id))
    }
}

/// A chunk produced by the chunker, optionally carrying its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub document_id: i64,
    pub content: String,
    pub content_hash: ContentHash,
    pub embedding: Option<Vec<f32>>,
}

/// A persisted chunk row. Its vector, if any, lives in the vector index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub content: String,
    pub content_hash: ContentHash,
}

/// Row counts across the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: i64,
    pub chunks: i64,
    pub embedded_chunks: i64,
}
