//! Shared plumbing for the external HTTP APIs.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! With `max_retries = 0` a call is a single attempt.

use anyhow::Result;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0} environment variable not set")]
    MissingApiKey(String),
    #[error("{service} API error {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("invalid {service} response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },
}

/// Read a bearer token from the named environment variable.
pub fn api_key(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| UpstreamError::MissingApiKey(var.to_string()).into())
}

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a request, retrying transient failures.
///
/// `build` is called once per attempt because request bodies such as
/// multipart forms cannot be reused.
pub async fn send_with_retry<F>(
    service: &'static str,
    max_retries: u32,
    build: F,
) -> Result<reqwest::Response>
where
    F: Fn() -> Result<reqwest::RequestBuilder>,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(service, attempt, ?delay, "retrying upstream call");
            tokio::time::sleep(delay).await;
        }

        match build()?.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let body = response.text().await.unwrap_or_default();
                let err = UpstreamError::Status {
                    service,
                    status: status.as_u16(),
                    body,
                };

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err.into());
                    continue;
                }

                return Err(err.into());
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} call failed after retries", service)))
}
