//! Shared JSON-over-HTTP plumbing for the embedding and language-model clients.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

/// How a request authenticates. Keys never go into the URL.
#[derive(Clone, Copy)]
pub(crate) enum Auth<'a> {
    None,
    Bearer(&'a str),
    /// A key sent in the named header (e.g. `x-goog-api-key`).
    Header(&'static str, &'a str),
}

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POSTs `body` to `url` and returns the parsed JSON response, retrying
/// transient failures up to `max_retries` times.
///
/// `service` names the remote side in error messages (e.g. `"OpenAI API"`).
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    auth: Auth<'_>,
    body: &serde_json::Value,
    max_retries: u32,
    service: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::warn!(
                service,
                attempt,
                max_retries,
                "request failed, retrying in {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        match auth {
            Auth::None => {}
            Auth::Bearer(token) => {
                request = request.header("Authorization", format!("Bearer {}", token));
            }
            Auth::Header(name, key) => {
                request = request.header(name, key);
            }
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!("{} error {}: {}", service, status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("{} error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} connection error: {}", service, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", service)))
}
