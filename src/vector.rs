//! Nearest-neighbor index over chunk embeddings.
//!
//! A [`VectorIndex`] stores one fixed-dimension vector per chunk id and
//! answers k-nearest-neighbor queries by cosine distance. Two backends exist:
//! [`MemoryIndex`] here, and `SqliteVectorIndex` in [`crate::store::sqlite`],
//! which keeps vectors in their own table beside the chunk rows.
//!
//! # Contract
//!
//! - Vectors whose length differs from [`VectorIndex::dims`] are rejected
//!   with [`Error::EmbeddingDimensionMismatch`], on both `add` and `search`.
//! - Searching an empty index returns an empty list, whatever the query's
//!   length, since there is nothing to compare against.
//! - Results are ordered by ascending distance; equal distances keep
//!   insertion order. At most `k` results are returned.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::cosine_distance;
use crate::error::{Error, Result};

/// One search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub chunk_id: i64,
    pub distance: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The dimensionality every stored and query vector must have.
    fn dims(&self) -> usize;

    /// Store `vector` for `chunk_id`, replacing any previous entry.
    async fn add(&self, chunk_id: i64, vector: &[f32]) -> Result<()>;

    /// The `k` nearest chunk ids to `query`, nearest first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Number of stored vectors.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Reject a vector whose length is not `expected`.
pub fn check_dims(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::EmbeddingDimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Rank `entries` (given in insertion order) against `query`.
///
/// Uses a stable sort so that ties keep insertion order.
pub fn rank_nearest<'a, I>(query: &[f32], entries: I, k: usize) -> Vec<Neighbor>
where
    I: IntoIterator<Item = (i64, &'a [f32])>,
{
    let mut scored: Vec<Neighbor> = entries
        .into_iter()
        .map(|(chunk_id, vector)| Neighbor {
            chunk_id,
            distance: cosine_distance(query, vector),
        })
        .collect();
    scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    scored.truncate(k);
    scored
}

/// Brute-force in-memory index.
pub struct MemoryIndex {
    dims: usize,
    entries: RwLock<Vec<(i64, Vec<f32>)>>,
}

impl MemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Insert without a dimension check; callers validate first.
    pub(crate) fn put(&self, chunk_id: i64, vector: Vec<f32>) {
        let mut entries = self.entries.write().unwrap();
        match entries.iter_mut().find(|(id, _)| *id == chunk_id) {
            Some(entry) => entry.1 = vector,
            None => entries.push((chunk_id, vector)),
        }
    }

    pub(crate) fn contains(&self, chunk_id: i64) -> bool {
        self.entries
            .read()
            .unwrap()
            .iter()
            .any(|(id, _)| *id == chunk_id)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn add(&self, chunk_id: i64, vector: &[f32]) -> Result<()> {
        check_dims(self.dims, vector)?;
        self.put(chunk_id, vector.to_vec());
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let entries = self.entries.read().unwrap();
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        check_dims(self.dims, query)?;
        Ok(rank_nearest(
            query,
            entries.iter().map(|(id, v)| (*id, v.as_slice())),
            k,
        ))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().unwrap().len())
    }
}
