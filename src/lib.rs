//! # docent
//!
//! A content-addressed document store with retrieval-augmented answering.
//!
//! Markdown files with Hugo-style front matter are parsed into documents,
//! split into paragraph chunks, embedded, and stored in SQLite. Queries are
//! embedded, matched against chunk vectors by cosine distance, and answered
//! by a completion model prompted with the nearest chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Markdown  │──▶│ parse → chunk →  │──▶│    SQLite    │
//! │  + front   │   │ embed (IngestQ)  │   │ docs/chunks/ │
//! │   matter   │   └──────────────────┘   │   vectors    │
//! └────────────┘                          └──────┬───────┘
//!                                                │
//!                      ┌─────────────────────────┘
//!                      ▼
//!              ┌───────────────┐    ┌────────────┐
//!              │ Orchestrator  │───▶│ completion │
//!              │ embed → top-k │    │  provider  │
//!              └───────────────┘    └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docent init                          # create database
//! docent ingest ./content --recursive  # ingest a Hugo content tree
//! docent embed pending                 # backfill missing vectors
//! docent ask "What is epistemic technology?"
//! docent chat                          # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`hash`] | SHA-256 content digests |
//! | [`frontmatter`] | Front-matter parsing |
//! | [`chunk`] | Paragraph chunking |
//! | [`store`] | [`DocumentStore`](store::DocumentStore) trait, SQLite and in-memory backends |
//! | [`vector`] | [`VectorIndex`](vector::VectorIndex) trait and cosine ranking |
//! | [`embedding`] / [`completion`] | Provider traits and OpenAI clients |
//! | [`ingest`] / [`tasks`] | Ingestion pipeline and worker queue |
//! | [`backfill`] | Embedding backfill |
//! | [`retrieval`] | Query answering |
//! | [`db`] / [`migrate`] | Connection setup and schema |

pub mod backfill;
pub mod chat;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod frontmatter;
pub mod get;
pub mod hash;
pub mod ingest;
pub mod migrate;
pub mod models;
mod openai;
pub mod retrieval;
pub mod stats;
pub mod store;
pub mod tasks;
pub mod vector;

pub use error::{Error, Result};
