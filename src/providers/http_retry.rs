//! Retry wrapper for idempotent reads (list, download).
//!
//! Retries on 429 (Too Many Requests) and 5xx with exponential backoff and
//! jitter, honoring a numeric `Retry-After` header. Writes never go through
//! here: a create that timed out after reaching the store would be duplicated.

use rand::Rng;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Request, Response, StatusCode};
use std::time::Duration;

/// Longest wait honored from a `Retry-After` header
const MAX_SERVER_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct HttpRetryConfig {
    /// Attempts after the first request
    pub max_retries: u32,
    /// First backoff step; doubles on every attempt
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl HttpRetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based), plus up to 30% jitter
    fn backoff(&self, attempt: u32) -> Duration {
        let step = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        let jitter = (step as f64 * rand::thread_rng().gen_range(0.1..0.3)) as u64;
        Duration::from_millis(step + jitter)
    }
}

/// Rate limiting and gateway/backend hiccups
fn is_transient(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Wait the server asked for, in whole seconds
fn server_requested_wait(response: &Response) -> Option<Duration> {
    let secs: u64 = response.headers().get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(secs).min(MAX_SERVER_WAIT))
}

/// Send a request, retrying on 429/5xx.
///
/// The final response is returned as-is (including a still-failing status)
/// so the caller keeps ownership of status mapping. Requests whose body
/// cannot be cloned are sent once.
pub async fn send_with_retry(
    client: &Client,
    request: Request,
    config: &HttpRetryConfig,
) -> Result<Response, reqwest::Error> {
    let template = request.try_clone();
    let mut last_response = client.execute(request).await?;

    let Some(template) = template else {
        return Ok(last_response);
    };

    for attempt in 0..config.max_retries {
        if !is_transient(last_response.status()) {
            return Ok(last_response);
        }

        let delay = server_requested_wait(&last_response).unwrap_or_else(|| config.backoff(attempt));

        tracing::debug!(
            "HTTP {} {} returned {}. Retry {}/{} after {:?}",
            template.method(),
            template.url(),
            last_response.status(),
            attempt + 1,
            config.max_retries,
            delay
        );

        tokio::time::sleep(delay).await;

        let Some(retry) = template.try_clone() else {
            break;
        };
        last_response = client.execute(retry).await?;
    }

    Ok(last_response)
}
