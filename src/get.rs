//! Document and chunk inspection commands.
//!
//! Backs `docent documents`, `docent chunks`, and `docent get`.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::models::Document;
use crate::store::DocumentStore;

/// List every stored document, one line each.
pub async fn run_documents(config: &Config) -> Result<()> {
    let store = db::open_store(config).await?;
    let docs = store.get_all_documents().await?;

    if docs.is_empty() {
        println!("No documents stored.");
    }
    for doc in &docs {
        let chunks = store.get_chunks_for_document(doc.id).await?.len();
        println!("{:>6}  {:<50} {:>4} chunks", doc.id, doc.display_name(), chunks);
    }

    store.pool().close().await;
    Ok(())
}

/// List chunks, optionally restricted to one document.
pub async fn run_chunks(config: &Config, document: Option<i64>) -> Result<()> {
    let store = db::open_store(config).await?;
    let chunks = match document {
        Some(id) => store.get_chunks_for_document(id).await?,
        None => store.get_all_chunks().await?,
    };

    for chunk in &chunks {
        println!("[chunk {} / document {}]", chunk.id, chunk.document_id);
        println!("{}", chunk.content);
        println!();
    }
    println!("{} chunk(s)", chunks.len());

    store.pool().close().await;
    Ok(())
}

/// Print a document's metadata, body, and chunks.
pub async fn run_get(config: &Config, id: i64) -> Result<()> {
    let store = db::open_store(config).await?;
    let Some(doc) = store.get_by_id(id).await? else {
        bail!("document not found: {}", id);
    };
    let chunks = store.get_chunks_for_document(id).await?;

    print_metadata(&doc);
    println!();

    println!("--- Body ---");
    println!("{}", doc.content);
    println!();

    println!("--- Chunks ({}) ---", chunks.len());
    for chunk in &chunks {
        println!("[chunk {}]", chunk.id);
        println!("{}", chunk.content);
        println!();
    }

    store.pool().close().await;
    Ok(())
}

fn print_metadata(doc: &Document) {
    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!(
        "title:        {}",
        doc.title.as_deref().unwrap_or("(untitled)")
    );
    if let Some(ref author) = doc.author {
        println!("author:       {}", author);
    }
    if let Some(ref date) = doc.publication_date {
        println!("date:         {}", date);
    }
    if let Some(ref url) = doc.url {
        println!("url:          {}", url);
    }
    if let Some(ref path) = doc.file_path {
        println!("file:         {}", path);
    }
    println!("hash:         {}", doc.content_hash);
}
