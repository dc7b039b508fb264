//! Configuration loading and validation.
//!
//! All runtime settings (database path, provider credentials, retrieval and
//! ingestion tuning) live in one TOML file, parsed into [`Config`] and
//! validated once by [`load_config`]. Components receive the sections they
//! need through their constructors; nothing reads the environment afterwards.
//!
//! ```toml
//! [db]
//! path = "./data/docent.sqlite"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [completion]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [retrieval]
//! top_k = 5
//!
//! [ingest]
//! include_globs = ["**/*.md"]
//! workers = 4
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no `api_key` is set in the file.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            api_key: None,
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_completion_model(),
            system_prompt: default_system_prompt(),
            api_key: None,
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Requester id sent to the embedding provider during batch ingestion.
    #[serde(default = "default_requester")]
    pub requester_id: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            workers: default_workers(),
            requester_id: default_requester(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_completion_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_completion_timeout_secs() -> u64 {
    120
}
fn default_top_k() -> usize {
    5
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}
fn default_workers() -> usize {
    4
}
fn default_requester() -> i64 {
    1
}

fn default_system_prompt() -> String {
    "You are a helpful assistant answering questions about a collection of published \
     writing. Ground your answers in the documents provided with each query, cite them \
     by document ID when you rely on them, and say so plainly when they do not contain \
     the answer."
        .to_string()
}

impl Config {
    /// A config with every section at its default and both providers disabled.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            retrieval: RetrievalConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

/// Read, parse, and validate a config file.
///
/// Provider API keys missing from the file are filled from
/// [`API_KEY_ENV`] here, once.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty());
    if config.embedding.api_key.is_none() {
        config.embedding.api_key = env_key.clone();
    }
    if config.completion.api_key.is_none() {
        config.completion.api_key = env_key;
    }

    validate(&config)?;
    Ok(config)
}

/// Check invariants that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.ingest.workers == 0 {
        bail!("ingest.workers must be >= 1");
    }

    for (section, provider) in [
        ("embedding", config.embedding.provider.as_str()),
        ("completion", config.completion.provider.as_str()),
    ] {
        match provider {
            "disabled" | "openai" => {}
            other => bail!(
                "Unknown {} provider: '{}'. Must be disabled or openai.",
                section,
                other
            ),
        }
    }

    if config.embedding.is_enabled() && config.embedding.model.trim().is_empty() {
        bail!("embedding.model is required when a provider is enabled");
    }
    if config.completion.is_enabled() && config.completion.model.trim().is_empty() {
        bail!("completion.model is required when a provider is enabled");
    }

    if config.embedding.is_enabled() && config.embedding.api_key.is_none() {
        bail!(
            "embedding provider '{}' needs an api_key (or {} in the environment)",
            config.embedding.provider,
            API_KEY_ENV
        );
    }
    if config.completion.is_enabled() && config.completion.api_key.is_none() {
        bail!(
            "completion provider '{}' needs an api_key (or {} in the environment)",
            config.completion.provider,
            API_KEY_ENV
        );
    }

    Ok(())
}
