//! Paragraph-boundary text chunker.
//!
//! Splits a document body into [`NewChunk`]s for independent retrieval.
//!
//! # Algorithm
//!
//! 1. Reject bodies that are empty after trimming ([`Error::EmptyContent`]).
//! 2. Split on `\n\n` paragraph boundaries.
//! 3. Trim each paragraph and drop the empty ones; emit one chunk per
//!    remaining paragraph, in order.
//! 4. Append one final chunk holding the whole body exactly as given, so
//!    broad queries still have a unit that covers the entire document.
//!
//! Every chunk carries the SHA-256 of its own text.
//!
//! # Example
//!
//! ```rust
//! use docent::chunk::chunk_document;
//!
//! let chunks = chunk_document(7, "A\n\nB").unwrap();
//! let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
//! assert_eq!(texts, ["A", "B", "A\n\nB"]);
//! ```

use crate::error::{Error, Result};
use crate::hash::content_hash;
use crate::models::NewChunk;

/// Split `body` into paragraph chunks followed by a whole-body chunk.
///
/// The returned chunks have no embeddings; see [`attach_embeddings`].
pub fn chunk_document(document_id: i64, body: &str) -> Result<Vec<NewChunk>> {
    if body.trim().is_empty() {
        return Err(Error::EmptyContent);
    }

    let mut chunks: Vec<NewChunk> = body
        .split("\n\n")
        .map(str::trim)
        .filter(|para| !para.is_empty())
        .map(|para| make_chunk(document_id, para))
        .collect();

    chunks.push(make_chunk(document_id, body));
    Ok(chunks)
}

/// Assign `vectors` to `chunks` by position.
///
/// The embedding collaborator returns vectors in input order and carries no
/// per-item id, so position is the only link. A count mismatch means the
/// response cannot be aligned and is rejected without touching any chunk.
pub fn attach_embeddings(chunks: &mut [NewChunk], vectors: Vec<Vec<f32>>) -> Result<()> {
    if vectors.len() != chunks.len() {
        return Err(Error::EmbeddingProvider(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            vectors.len()
        )));
    }
    for (chunk, vector) in chunks.iter_mut().zip(vectors) {
        chunk.embedding = Some(vector);
    }
    Ok(())
}

/// The texts to send to the embedding collaborator, in chunk order.
pub fn embedding_inputs(chunks: &[NewChunk]) -> Vec<String> {
    chunks.iter().map(|c| c.content.clone()).collect()
}

fn make_chunk(document_id: i64, text: &str) -> NewChunk {
    NewChunk {
        document_id,
        content: text.to_string(),
        content_hash: content_hash(text),
        embedding: None,
    }
}
