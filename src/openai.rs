//! Shared HTTP plumbing for the OpenAI-compatible providers.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use tracing::{debug, warn};

/// A JSON-over-HTTPS client for one OpenAI-compatible endpoint family.
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
}

impl ApiClient {
    pub(crate) fn new(
        base_url: &str,
        api_key: &str,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, String> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            max_retries,
        })
    }

    /// POST `body` to `{base_url}/{path}` and return the parsed JSON response.
    ///
    /// Errors are returned as strings; callers wrap them in the error variant
    /// for their collaborator.
    pub(crate) async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        let url = format!("{}/{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(%url, attempt, ?delay, "retrying request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| format!("invalid JSON response: {}", e));
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%url, %status, attempt, "transient API error");
                        last_err = Some(format!("API error {}: {}", status, body_text));
                        continue;
                    }

                    return Err(format!("API error {}: {}", status, body_text));
                }
                Err(e) => {
                    warn!(%url, attempt, error = %e, "request failed");
                    last_err = Some(format!("request to {} failed: {}", url, e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "request failed after retries".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:9/v1/", "k", 1, 0).unwrap();
        assert_eq!(client.base_url, "http://localhost:9/v1");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_url() {
        let client = ApiClient::new("http://127.0.0.1:9/v1", "k", 1, 0).unwrap();
        let err = client
            .post_json("embeddings", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.contains("http://127.0.0.1:9/v1/embeddings"), "{}", err);
    }
}
