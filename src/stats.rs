//! Database statistics overview.
//!
//! Summarizes what is stored: document and chunk counts plus embedding
//! coverage. Used by `docent stats` to confirm that ingestion and backfill
//! are working.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::db;
use crate::store::DocumentStore;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = db::open_store(config)
        .await
        .with_context(|| format!("Failed to open database: {}", config.db.path.display()))?;
    let stats = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docent database stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded_chunks,
        stats.chunks,
        coverage_percent(stats.embedded_chunks, stats.chunks)
    );
    println!();

    store.pool().close().await;
    Ok(())
}

fn coverage_percent(embedded: i64, total: i64) -> i64 {
    if total > 0 {
        (embedded * 100) / total
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
