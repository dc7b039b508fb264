//! # docent CLI
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent init` | Create the SQLite database and run schema migrations |
//! | `docent ingest <path>` | Ingest a Markdown file or directory |
//! | `docent documents` | List stored documents |
//! | `docent chunks` | List stored chunks |
//! | `docent get <id>` | Show one document with its chunks |
//! | `docent stats` | Document, chunk, and embedding counts |
//! | `docent embed pending` | Embed chunks that have no vector |
//! | `docent ask "<query>"` | Answer one query from the stored documents |
//! | `docent chat` | Interactive question answering |

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use docent::{backfill, chat, config, db, get, ingest, migrate, stats};

/// docent: a content-addressed document store with retrieval-augmented
/// answering.
#[derive(Parser)]
#[command(name = "docent", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist, `init` falls back to defaults with both
    /// providers disabled.
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents, chunks, and
    /// chunk_vectors tables. Safe to run repeatedly.
    Init,

    /// Ingest a Markdown file, or every matching file in a directory.
    ///
    /// Content that is already stored is skipped. Directory ingestion runs
    /// on `[ingest] workers` workers and reports per-file failures without
    /// stopping.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,

        /// Descend into subdirectories.
        #[arg(long, short)]
        recursive: bool,
    },

    /// List stored documents.
    Documents,

    /// List stored chunks.
    Chunks {
        /// Only chunks of this document.
        #[arg(long)]
        document: Option<i64>,
    },

    /// Show a document's metadata, body, and chunks.
    Get {
        /// Document id.
        id: i64,
    },

    /// Show document, chunk, and embedding counts.
    Stats,

    /// Manage embedding vectors.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Answer one query using the stored documents.
    Ask {
        query: String,

        /// Conversation so far, as `User:`/`Bot:` lines.
        #[arg(long, default_value = "")]
        history: String,

        /// Requester id forwarded to the embedding provider.
        #[arg(long, default_value_t = 1)]
        user: i64,
    },

    /// Start an interactive question-answering session.
    Chat {
        /// Requester id forwarded to the embedding provider.
        #[arg(long, default_value_t = 1)]
        user: i64,
    },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed chunks that have no vector yet.
    Pending {
        /// Maximum number of chunks to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config (number of texts per API call).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // init works without a config file
    if matches!(cli.command, Commands::Init) {
        let cfg = if cli.config.exists() {
            config::load_config(&cli.config)?
        } else {
            config::Config::minimal("./data/docent.sqlite")
        };
        let pool = db::connect(&cfg)
            .await
            .with_context(|| format!("Failed to open database: {}", cfg.db.path.display()))?;
        migrate::run_migrations(&pool).await?;
        pool.close().await;
        println!("Database initialized at {}", cfg.db.path.display());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => unreachable!("handled above"),
        Commands::Ingest { path, recursive } => {
            ingest::run_ingest(&cfg, &path, recursive).await?;
        }
        Commands::Documents => {
            get::run_documents(&cfg).await?;
        }
        Commands::Chunks { document } => {
            get::run_chunks(&cfg, document).await?;
        }
        Commands::Get { id } => {
            get::run_get(&cfg, id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit, batch_size } => {
                backfill::run_embed_pending(&cfg, limit, batch_size).await?;
            }
        },
        Commands::Ask {
            query,
            history,
            user,
        } => {
            chat::run_ask(&cfg, &query, &history, user).await?;
        }
        Commands::Chat { user } => {
            chat::run_chat(&cfg, user).await?;
        }
    }

    Ok(())
}
