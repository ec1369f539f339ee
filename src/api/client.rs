use crate::config::Settings;
use crate::error::{BridgeError, Result};
use crate::index::Blob;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Per-request timeout for both upload and search calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Search retries never back off from less than this base delay
const SEARCH_DELAY_FLOOR: f64 = 2.0;

/// Message returned when the remote index has nothing for a query
pub const NO_CONTEXT_MESSAGE: &str = "No relevant code context found for your query.";

#[derive(Serialize)]
struct BlobPayload<'a> {
    path: String,
    content: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    blob_names: Vec<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    formatted_retrieval: Option<String>,
}

/// One attempt's failure, classified so the retry loop does not have to
/// guess from error text
#[derive(Debug)]
struct AttemptError {
    transient: bool,
    message: String,
}

impl AttemptError {
    fn transient(message: String) -> Self {
        Self {
            transient: true,
            message,
        }
    }

    fn permanent(message: String) -> Self {
        Self {
            transient: false,
            message,
        }
    }
}

/// Client for the remote retrieval API.
///
/// One shared reqwest client backs both operations, so uploads and searches
/// draw from the same connection pool. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
    max_retries: u32,
    retry_delay: f64,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        })
    }

    /// Upload one batch of blobs, returning the identities the API
    /// acknowledged, in request order and unmodified.
    pub async fn upload_batch(&self, blobs: &[Blob]) -> Result<Vec<String>> {
        let payload: Vec<BlobPayload> = blobs
            .iter()
            .map(|b| BlobPayload {
                path: b.label(),
                content: &b.content,
            })
            .collect();
        let body = json!({ "blobs": payload });
        let url = format!("{}/batch-upload", self.base_url);

        let mut last_message = String::new();
        for attempt in 1..=self.max_retries {
            match self.post_once(&url, &body).await {
                Ok(value) => {
                    let parsed: UploadResponse = serde_json::from_value(value).map_err(|e| {
                        BridgeError::UploadPermanent(format!("unexpected response shape: {}", e))
                    })?;
                    return Ok(parsed.blob_names);
                }
                Err(e) if e.transient => {
                    last_message = e.message;
                    if attempt < self.max_retries {
                        let delay = backoff_delay(self.retry_delay, attempt);
                        log::warn!(
                            "upload attempt {}/{} failed ({}), retrying in {:.1}s",
                            attempt,
                            self.max_retries,
                            last_message,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(BridgeError::UploadPermanent(e.message)),
            }
        }

        Err(BridgeError::UploadTransient {
            attempts: self.max_retries,
            message: last_message,
        })
    }

    /// Query the remote index over the project's known identities.
    ///
    /// The request always reports an additive view: no checkpoint, no
    /// deletions.
    pub async fn search(&self, query: &str, identities: &[String]) -> Result<String> {
        let body = json!({
            "information_request": query,
            "blobs": {
                "checkpoint_id": null,
                "added_blobs": identities,
                "deleted_blobs": [],
            },
            "dialog": [],
            "max_output_length": 0,
            "disable_codebase_retrieval": false,
            "enable_commit_retrieval": false,
        });
        let url = format!("{}/agents/codebase-retrieval", self.base_url);
        let base_delay = self.retry_delay.max(SEARCH_DELAY_FLOOR);

        let mut last_message = String::new();
        for attempt in 1..=self.max_retries {
            match self.post_once(&url, &body).await {
                Ok(value) => {
                    let parsed: SearchResponse = serde_json::from_value(value)
                        .map_err(|e| BridgeError::Search(format!("unexpected response shape: {}", e)))?;
                    return Ok(match parsed.formatted_retrieval {
                        Some(text) if !text.is_empty() => text,
                        _ => NO_CONTEXT_MESSAGE.to_string(),
                    });
                }
                Err(e) if e.transient => {
                    last_message = e.message;
                    if attempt < self.max_retries {
                        let delay = backoff_delay(base_delay, attempt);
                        log::warn!(
                            "search attempt {}/{} failed ({}), retrying in {:.1}s",
                            attempt,
                            self.max_retries,
                            last_message,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(BridgeError::Search(e.message)),
            }
        }

        Err(BridgeError::Search(format!(
            "exhausted {} attempts: {}",
            self.max_retries, last_message
        )))
    }

    /// One POST attempt. Timeouts, connection failures, body-read failures
    /// and 5xx statuses are transient; 4xx statuses and undecodable bodies
    /// are permanent.
    async fn post_once(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<serde_json::Value, AttemptError> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AttemptError::transient(format!("network error: {}", e))
                } else {
                    AttemptError::permanent(format!("request error: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::transient(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AttemptError::permanent(format!(
                "HTTP {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let bytes = response.bytes().await.map_err(|e| {
            // The connection produced a success status but the body never
            // arrived in full
            AttemptError::transient(format!("failed to read response: {}", e))
        })?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AttemptError::permanent(format!("invalid JSON response: {}", e)))
    }
}

/// Exponential backoff: `base * 2^(attempt-1)` seconds
fn backoff_delay(base_seconds: f64, attempt: u32) -> Duration {
    Duration::from_secs_f64(base_seconds * f64::from(2u32.pow(attempt.saturating_sub(1))))
}
