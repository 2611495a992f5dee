use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::DeliveryError;

/// Retry policy for outbound HTTP calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryOptions {
    /// Maximum number of retry attempts after the initial attempt.
    pub max_retries: u32,

    /// Backoff base; doubles with every attempt.
    pub base_ms: u64,

    /// Upper bound for the backoff delay.
    pub max_ms: u64,

    /// Random jitter added on top of each delay.
    pub jitter_ms: u64,

    /// Maximum time allowed for a single attempt.
    pub timeout: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_ms: 100,
            max_ms: 5_000,
            jitter_ms: 50,
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryOptions {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base_ms: u64, max_ms: u64, jitter_ms: u64) -> Self {
        self.base_ms = base_ms;
        self.max_ms = max_ms;
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_ms.max(1);
        let max = self.max_ms.max(base);
        let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
        let exp = base.saturating_mul(pow);
        Duration::from_millis(exp.min(max))
    }
}

fn jitter_delay(jitter_ms: u64) -> Duration {
    if jitter_ms == 0 {
        return Duration::from_millis(0);
    }
    Duration::from_millis(fastrand::u64(0..=jitter_ms))
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Final answer of a POST after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResponse {
    pub status: u16,
    pub status_text: String,
}

impl PostResponse {
    fn from_status(status: StatusCode) -> Self {
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// POST `body` to `url`, retrying network errors, 429 and 5xx responses.
///
/// Other statuses are returned as-is; deciding whether they are acceptable
/// is up to the caller. Network errors that survive all retries become
/// [`DeliveryError::Transport`].
pub async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, String)],
    body: &[u8],
    retry: &RetryOptions,
) -> Result<PostResponse, DeliveryError> {
    let mut attempt = 0u32;

    loop {
        let mut request = client
            .post(url)
            .timeout(retry.timeout)
            .body(body.to_vec());
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let outcome = request.send().await;
        let retryable = match &outcome {
            Ok(response) => is_retryable(response.status()),
            Err(_) => true,
        };

        if !retryable || attempt >= retry.max_retries {
            return match outcome {
                Ok(response) => Ok(PostResponse::from_status(response.status())),
                Err(err) if err.is_timeout() => {
                    Err(DeliveryError::Transport(format!("request to {url} timed out")))
                }
                Err(err) => Err(DeliveryError::Transport(err.to_string())),
            };
        }

        attempt += 1;
        match &outcome {
            Ok(response) => warn!(url, status = response.status().as_u16(), attempt, "retrying POST"),
            Err(err) => warn!(url, error = %err, attempt, "retrying POST"),
        }

        let delay = retry.delay_for_attempt(attempt) + jitter_delay(retry.jitter_ms);
        debug!(
            url,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "backing off"
        );
        sleep(delay).await;
    }
}
