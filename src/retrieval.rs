//! Retrieval-augmented answering.
//!
//! [`Orchestrator::answer`] embeds the query, pulls the nearest chunks from
//! the vector index, folds them and the conversation history into one prompt,
//! and hands that prompt to the completion provider. The answer carries the
//! chunks used and their source documents, de-duplicated in rank order.
//!
//! Any failing step aborts the call; there is no partial answer.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::completion::CompletionProvider;
use crate::embedding::{embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Chunk, Document};
use crate::store::DocumentStore;
use crate::vector::VectorIndex;

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: String,
    /// Retrieved chunks, nearest first.
    pub chunks: Vec<Chunk>,
    /// Documents owning `chunks`, each once, in first-seen order.
    pub sources: Vec<Document>,
}

pub struct Orchestrator {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    completer: Arc<dyn CompletionProvider>,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            completer,
            top_k,
        }
    }

    pub async fn answer(&self, user_id: i64, query: &str, history: &str) -> Result<Answer> {
        let query_vector = embed_query(self.embedder.as_ref(), query, user_id).await?;

        let neighbors = self.index.search(&query_vector, self.top_k).await?;
        let ids: Vec<i64> = neighbors.iter().map(|n| n.chunk_id).collect();
        let chunks = self.store.get_chunks_by_ids(&ids).await?;
        debug!(user_id, hits = chunks.len(), "retrieved chunks");

        let prompt = build_prompt(query, history, &chunks);
        let response = self.completer.complete(&prompt).await?;

        let sources = self.sources_for(&chunks).await?;
        info!(
            user_id,
            chunks = chunks.len(),
            sources = sources.len(),
            "answered query"
        );

        Ok(Answer {
            response,
            chunks,
            sources,
        })
    }

    async fn sources_for(&self, chunks: &[Chunk]) -> Result<Vec<Document>> {
        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        for chunk in chunks {
            if !seen.insert(chunk.document_id) {
                continue;
            }
            let doc = self
                .store
                .get_by_id(chunk.document_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("document {}", chunk.document_id)))?;
            sources.push(doc);
        }
        Ok(sources)
    }
}

/// Assemble the single prompt sent to the completion provider.
pub fn build_prompt(query: &str, history: &str, chunks: &[Chunk]) -> String {
    let mut prompt = String::from("This is our conversation history: ");
    prompt.push_str(history);
    prompt.push_str("\n\n");
    prompt.push_str("This is a list of documents that are relevant to the conversation: ");
    for chunk in chunks {
        prompt.push_str(&format!("Document ID: {}\n", chunk.document_id));
        prompt.push_str(&format!("Document Content: {}\n", chunk.content));
    }
    prompt.push_str("This is the user's query: ");
    prompt.push_str(query);
    prompt
}

/// Running transcript for an interactive session, as `User:`/`Bot:` lines.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    history: String,
}

impl Conversation {
    pub fn history(&self) -> &str {
        &self.history
    }

    pub fn push_user(&mut self, text: &str) {
        self.push_line("User: ", text);
    }

    pub fn push_bot(&mut self, text: &str) {
        self.push_line("Bot: ", text);
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    fn push_line(&mut self, speaker: &str, text: &str) {
        if !self.history.is_empty() {
            self.history.push('\n');
        }
        self.history.push_str(speaker);
        self.history.push_str(text);
    }
}
