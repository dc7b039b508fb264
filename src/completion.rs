//! Completion provider abstraction.
//!
//! The retrieval orchestrator hands one fully assembled prompt to a
//! [`CompletionProvider`] and returns the response text verbatim.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CompletionConfig;
use crate::error::{Error, Result};
use crate::openai::ApiClient;

/// A single request/response text-generation service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Instantiate the provider named in `config`.
pub fn create_completer(config: &CompletionConfig) -> Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompleter)),
        "openai" => Ok(Arc::new(OpenAICompleter::new(config)?)),
        other => Err(Error::Config(format!(
            "unknown completion provider: {}",
            other
        ))),
    }
}

/// Fails every request; used when no completion provider is configured.
pub struct DisabledCompleter;

#[async_trait]
impl CompletionProvider for DisabledCompleter {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::CompletionProvider(
            "completion provider is disabled; set [completion] provider in config".to_string(),
        ))
    }
}

/// Chat-completions client sending the configured system prompt plus the
/// assembled user prompt.
pub struct OpenAICompleter {
    client: ApiClient,
    model: String,
    system_prompt: String,
}

impl OpenAICompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("completion.api_key required for OpenAI".to_string()))?;
        let client = ApiClient::new(
            &config.base_url,
            api_key,
            config.timeout_secs,
            config.max_retries,
        )
        .map_err(Error::Config)?;
        Ok(Self {
            client,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": prompt },
            ],
        });

        let json = self
            .client
            .post_json("chat/completions", &body)
            .await
            .map_err(Error::CompletionProvider)?;

        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::CompletionProvider("invalid response: no choices[0].message.content".to_string())
        })
}
