//! SQLite-backed [`DocumentStore`] and [`VectorIndex`].
//!
//! Documents and chunks live in relational tables; vectors live in the
//! separate `chunk_vectors` table as little-endian `f32` BLOBs. Chunk inserts
//! that carry an embedding write both rows inside one transaction.
//!
//! Vector search is a brute-force scan ranked by cosine distance, which is
//! adequate for a site-sized corpus.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::hash::ContentHash;
use crate::models::{Chunk, Document, NewChunk, NewDocument, StoreStats};
use crate::vector::{check_dims, rank_nearest, Neighbor, VectorIndex};

use super::{ChunkWrite, DocumentStore};

const DOCUMENT_COLUMNS: &str =
    "id, title, content, author, publication_date, url, file_path, content_hash";

/// SQLite implementation of [`DocumentStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    index: Arc<SqliteVectorIndex>,
}

impl SqliteStore {
    /// Wrap a migrated pool. `dims` is the vector dimensionality enforced on
    /// every embedding written through this store.
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        let index = Arc::new(SqliteVectorIndex::new(pool.clone(), dims));
        Self { pool, index }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The vector index backed by this store's `chunk_vectors` table.
    pub fn index(&self) -> Arc<SqliteVectorIndex> {
        Arc::clone(&self.index)
    }

    fn precheck_vectors(&self, chunks: &[NewChunk]) -> Result<()> {
        for chunk in chunks {
            if let Some(vector) = &chunk.embedding {
                check_dims(self.index.dims, vector)?;
            }
        }
        Ok(())
    }
}

fn parse_hash(raw: &str) -> Result<ContentHash> {
    raw.parse()
        .map_err(|e: hex::FromHexError| Error::Storage(sqlx::Error::Decode(Box::new(e))))
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let hash: String = row.try_get("content_hash")?;
    Ok(Document {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        publication_date: row.try_get("publication_date")?,
        url: row.try_get("url")?,
        file_path: row.try_get("file_path")?,
        content: row.try_get("content")?,
        content_hash: parse_hash(&hash)?,
    })
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let hash: String = row.try_get("content_hash")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        content: row.try_get("content")?,
        content_hash: parse_hash(&hash)?,
    })
}

/// Insert one chunk row (and its vector) on an open connection.
async fn write_chunk(
    conn: &mut SqliteConnection,
    document_id: i64,
    chunk: &NewChunk,
) -> std::result::Result<Chunk, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO chunks (document_id, content, content_hash) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(document_id)
    .bind(&chunk.content)
    .bind(chunk.content_hash.to_hex())
    .fetch_one(&mut *conn)
    .await?;

    if let Some(vector) = &chunk.embedding {
        write_vector(conn, id, vector).await?;
    }

    Ok(Chunk {
        id,
        document_id,
        content: chunk.content.clone(),
        content_hash: chunk.content_hash,
    })
}

async fn write_vector(
    conn: &mut SqliteConnection,
    chunk_id: i64,
    vector: &[f32],
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO chunk_vectors (chunk_id, dims, embedding)
        VALUES (?, ?, ?)
        ON CONFLICT(chunk_id) DO UPDATE SET
            dims = excluded.dims,
            embedding = excluded.embedding
        "#,
    )
    .bind(chunk_id)
    .bind(vector.len() as i64)
    .bind(vec_to_blob(vector))
    .execute(conn)
    .await?;
    Ok(())
}

/// Take the database write lock by touching the document row.
///
/// Returns false if the document does not exist. Once this returns, no other
/// connection can add chunks until the transaction ends.
async fn lock_document(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let touched = sqlx::query("UPDATE documents SET title = title WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await
        .map_err(Error::StorageWrite)?;
    Ok(touched.rows_affected() > 0)
}

async fn select_chunks(conn: &mut SqliteConnection, document_id: i64) -> Result<Vec<Chunk>> {
    let rows = sqlx::query(
        "SELECT id, document_id, content, content_hash FROM chunks WHERE document_id = ? ORDER BY id",
    )
    .bind(document_id)
    .fetch_all(conn)
    .await?;
    rows.iter().map(row_to_chunk).collect()
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(&self, doc: &NewDocument) -> Result<i64> {
        if doc.content.trim().is_empty() {
            return Err(Error::EmptyContent);
        }
        let hash = doc.hash().to_hex();

        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO documents (title, content, author, publication_date, url, file_path, content_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.author)
        .bind(&doc.publication_date)
        .bind(&doc.url)
        .bind(&doc.file_path)
        .bind(&hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::StorageWrite)?;

        if let Some(id) = inserted {
            debug!(id, %hash, "inserted document");
            return Ok(id);
        }

        let existing: i64 = sqlx::query_scalar("SELECT id FROM documents WHERE content_hash = ?")
            .bind(&hash)
            .fetch_one(&self.pool)
            .await?;
        debug!(id = existing, %hash, "document already stored");
        Ok(existing)
    }

    async fn has_been_processed(&self, hash: &ContentHash) -> Result<bool> {
        let processed: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM documents d
                JOIN chunks c ON c.document_id = d.id
                WHERE d.content_hash = ?
            )
            "#,
        )
        .bind(hash.to_hex())
        .fetch_one(&self.pool)
        .await?;
        Ok(processed != 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_by_hash(&self, hash: &ContentHash) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE content_hash = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(hash.to_hex())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn get_all_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY id",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_document).collect()
    }

    async fn get_chunks_for_document(&self, document_id: i64) -> Result<Vec<Chunk>> {
        let mut conn = self.pool.acquire().await?;
        select_chunks(&mut conn, document_id).await
    }

    async fn get_all_chunks(&self) -> Result<Vec<Chunk>> {
        let rows =
            sqlx::query("SELECT id, document_id, content, content_hash FROM chunks ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn get_chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query(
                "SELECT id, document_id, content, content_hash FROM chunks WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(row) = row {
                chunks.push(row_to_chunk(&row)?);
            }
        }
        Ok(chunks)
    }

    async fn insert_chunk(&self, chunk: &NewChunk) -> Result<Chunk> {
        self.precheck_vectors(std::slice::from_ref(chunk))?;

        let mut tx = self.pool.begin().await.map_err(Error::StorageWrite)?;
        if !lock_document(&mut *tx, chunk.document_id).await? {
            return Err(Error::NotFound(format!("document {}", chunk.document_id)));
        }
        let stored = write_chunk(&mut *tx, chunk.document_id, chunk)
            .await
            .map_err(Error::StorageWrite)?;
        tx.commit().await.map_err(Error::StorageWrite)?;
        Ok(stored)
    }

    async fn insert_chunks(&self, document_id: i64, chunks: &[NewChunk]) -> Result<ChunkWrite> {
        self.precheck_vectors(chunks)?;

        let mut tx = self.pool.begin().await.map_err(Error::StorageWrite)?;
        if !lock_document(&mut *tx, document_id).await? {
            return Err(Error::NotFound(format!("document {}", document_id)));
        }

        let existing = select_chunks(&mut *tx, document_id).await?;
        if !existing.is_empty() {
            tx.rollback().await.map_err(Error::StorageWrite)?;
            debug!(document_id, chunks = existing.len(), "chunks already stored");
            return Ok(ChunkWrite::Existing(existing));
        }

        let mut written = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let stored = write_chunk(&mut *tx, document_id, chunk)
                .await
                .map_err(Error::StorageWrite)?;
            written.push(stored);
        }

        tx.commit().await.map_err(Error::StorageWrite)?;
        debug!(document_id, chunks = written.len(), "stored chunks");
        Ok(ChunkWrite::Written(written))
    }

    async fn chunks_missing_embeddings(&self, limit: Option<usize>) -> Result<Vec<Chunk>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.content, c.content_hash
            FROM chunks c
            LEFT JOIN chunk_vectors v ON v.chunk_id = c.id
            WHERE v.chunk_id IS NULL
            ORDER BY c.id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM documents) AS documents,
                (SELECT COUNT(*) FROM chunks) AS chunks,
                (SELECT COUNT(*) FROM chunk_vectors) AS embedded
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreStats {
            documents: row.try_get("documents")?,
            chunks: row.try_get("chunks")?,
            embedded_chunks: row.try_get("embedded")?,
        })
    }
}

/// Vector index over the `chunk_vectors` table.
///
/// Rows are scanned in insertion order (`seq`), so ranking ties resolve to
/// the earliest-added vector. A stored vector whose length differs from the
/// configured dimensionality fails the search.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteVectorIndex {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn add(&self, chunk_id: i64, vector: &[f32]) -> Result<()> {
        check_dims(self.dims, vector)?;
        let mut conn = self.pool.acquire().await.map_err(Error::StorageWrite)?;
        write_vector(&mut conn, chunk_id, vector)
            .await
            .map_err(Error::StorageWrite)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query("SELECT chunk_id, dims, embedding FROM chunk_vectors ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_dims(self.dims, query)?;

        let mut entries: Vec<(i64, Vec<f32>)> = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk_id: i64 = row.try_get("chunk_id")?;
            let dims: i64 = row.try_get("dims")?;
            if dims as usize != self.dims {
                warn!(chunk_id, dims, expected = self.dims, "stored vector has foreign dimensionality");
                return Err(Error::EmbeddingDimensionMismatch {
                    expected: self.dims,
                    actual: dims as usize,
                });
            }
            let blob: Vec<u8> = row.try_get("embedding")?;
            entries.push((chunk_id, blob_to_vec(&blob)));
        }

        Ok(rank_nearest(
            query,
            entries.iter().map(|(id, v)| (*id, v.as_slice())),
            k,
        ))
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_document;
    use crate::db;
    use crate::migrate;

    async fn open(dims: usize) -> (tempfile::TempDir, SqliteStore) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::connect_path(&tmp.path().join("test.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool, dims))
    }

    #[tokio::test]
    async fn test_duplicate_hash_returns_existing_id() {
        let (_tmp, store) = open(2).await;
        let mut doc = NewDocument::from_content("Hello\n\nWorld");
        doc.title = Some("First".to_string());
        let a = store.insert_document(&doc).await.unwrap();
        doc.title = Some("Second".to_string());
        let b = store.insert_document(&doc).await.unwrap();
        assert_eq!(a, b);

        let docs = store.get_all_documents().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title.as_deref(), Some("First"));
        assert_eq!(docs[0].content_hash, doc.hash());
    }

    #[tokio::test]
    async fn test_chunks_and_vectors_roundtrip() {
        let (_tmp, store) = open(2).await;
        let doc = NewDocument::from_content("A\n\nB");
        let id = store.insert_document(&doc).await.unwrap();
        let mut chunks = chunk_document(0, &doc.content).unwrap();
        for (i, c) in chunks.iter_mut().enumerate() {
            c.embedding = Some(vec![1.0, i as f32]);
        }
        let written = store.insert_chunks(id, &chunks).await.unwrap().into_chunks();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|c| c.document_id == id));

        let fetched = store.get_chunks_for_document(id).await.unwrap();
        assert_eq!(fetched, written);
        assert_eq!(store.index().len().await.unwrap(), 3);
        assert!(store.has_been_processed(&doc.hash()).await.unwrap());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.embedded_chunks, 3);
    }

    #[tokio::test]
    async fn test_wrong_dims_rolls_back_everything() {
        let (_tmp, store) = open(2).await;
        let doc = NewDocument::from_content("A\n\nB");
        let id = store.insert_document(&doc).await.unwrap();
        let mut chunks = chunk_document(id, &doc.content).unwrap();
        chunks[2].embedding = Some(vec![1.0, 2.0, 3.0]);
        let err = store.insert_chunks(id, &chunks).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingDimensionMismatch { .. }));
        assert!(store.get_all_chunks().await.unwrap().is_empty());
        assert!(!store.has_been_processed(&doc.hash()).await.unwrap());
    }

    #[tokio::test]
    async fn test_chunk_without_embedding_is_pending() {
        let (_tmp, store) = open(2).await;
        let id = store
            .insert_document(&NewDocument::from_content("Only"))
            .await
            .unwrap();
        let chunks = chunk_document(id, "Only").unwrap();
        let stored = store.insert_chunk(&chunks[0]).await.unwrap();
        let pending = store.chunks_missing_embeddings(None).await.unwrap();
        assert_eq!(pending, vec![stored.clone()]);

        store.index().add(stored.id, &[0.5, 0.5]).await.unwrap();
        assert!(store.chunks_missing_embeddings(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunks_by_ids_keeps_requested_order() {
        let (_tmp, store) = open(2).await;
        let id = store
            .insert_document(&NewDocument::from_content("A\n\nB\n\nC"))
            .await
            .unwrap();
        let chunks = chunk_document(id, "A\n\nB\n\nC").unwrap();
        let written = store.insert_chunks(id, &chunks).await.unwrap().into_chunks();
        let ids = vec![written[2].id, 999, written[0].id];
        let fetched = store.get_chunks_by_ids(&ids).await.unwrap();
        let texts: Vec<&str> = fetched.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(texts, ["C", "A"]);
    }

    #[tokio::test]
    async fn test_index_search_and_mismatch() {
        let (_tmp, store) = open(3).await;
        let index = store.index();
        assert!(index.search(&[1.0], 5).await.unwrap().is_empty());

        let id = store
            .insert_document(&NewDocument::from_content("x\n\ny"))
            .await
            .unwrap();
        let mut chunks = chunk_document(id, "x\n\ny").unwrap();
        chunks[0].embedding = Some(vec![0.0, 1.0, 0.0]);
        chunks[1].embedding = Some(vec![1.0, 0.0, 0.0]);
        chunks[2].embedding = Some(vec![0.0, 0.0, 1.0]);
        let written = store.insert_chunks(id, &chunks).await.unwrap().into_chunks();

        let hits = index.search(&[1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, written[1].id);
        assert_eq!(hits[1].chunk_id, written[0].id);

        assert!(matches!(
            index.search(&[1.0, 0.0], 2).await,
            Err(Error::EmbeddingDimensionMismatch { expected: 3, actual: 2 })
        ));
    }

    #[tokio::test]
    async fn test_second_chunk_set_returns_existing() {
        let (_tmp, store) = open(2).await;
        let id = store
            .insert_document(&NewDocument::from_content("A\n\nB"))
            .await
            .unwrap();
        let chunks = chunk_document(id, "A\n\nB").unwrap();
        let first = store.insert_chunks(id, &chunks).await.unwrap();
        let second = store.insert_chunks(id, &chunks).await.unwrap();

        assert!(first.is_written());
        assert!(!second.is_written());
        assert_eq!(second.chunks(), first.chunks());
        assert_eq!(store.stats().await.unwrap().chunks, 3);
    }

    #[tokio::test]
    async fn test_concurrent_chunk_sets_store_one() {
        let (_tmp, store) = open(2).await;
        let store = Arc::new(store);
        let id = store
            .insert_document(&NewDocument::from_content("A\n\nB"))
            .await
            .unwrap();
        let chunks = chunk_document(id, "A\n\nB").unwrap();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            let chunks = chunks.clone();
            tasks.push(tokio::spawn(async move {
                store.insert_chunks(id, &chunks).await.unwrap()
            }));
        }
        let mut written = 0;
        for task in tasks {
            if task.await.unwrap().is_written() {
                written += 1;
            }
        }

        assert_eq!(written, 1);
        assert_eq!(store.stats().await.unwrap().chunks, 3);
    }

    #[tokio::test]
    async fn test_search_rejects_stored_vector_of_other_dims() {
        let (_tmp, store) = open(2).await;
        let id = store
            .insert_document(&NewDocument::from_content("x\n\ny"))
            .await
            .unwrap();
        let mut chunks = chunk_document(id, "x\n\ny").unwrap();
        chunks[0].embedding = Some(vec![1.0, 0.0]);
        let written = store.insert_chunks(id, &chunks).await.unwrap().into_chunks();

        // Left behind by a run configured with three dimensions.
        sqlx::query("INSERT INTO chunk_vectors (chunk_id, dims, embedding) VALUES (?, ?, ?)")
            .bind(written[1].id)
            .bind(3_i64)
            .bind(vec_to_blob(&[0.0, 1.0, 0.0]))
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.index().search(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(
            err,
            Error::EmbeddingDimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let (_tmp, store) = open(2).await;
        let err = store
            .insert_document(&NewDocument::from_content("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyContent));
        assert_eq!(store.stats().await.unwrap().documents, 0);
    }
}
