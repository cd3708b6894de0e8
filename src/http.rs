//! Outbound HTTP with bounded retries.
//!
//! Every upstream call in the service goes through [`RetryClient`] instead of
//! calling `reqwest::RequestBuilder::send()` directly, so that all sources
//! share one retry discipline:
//!
//! - at most `max_retries` attempts, counting the first one
//! - 4xx responses other than 408 and 429 are terminal and returned at once
//! - anything else (connect error, timeout, 5xx, 408, 429) sleeps
//!   `min(base * 2^(attempt-1), max)` plus up to 30% jitter and tries again
//!
//! The error returned after the last attempt keeps the upstream status and
//! body when a response was received (see [`FetchError`]).

use std::time::Duration;

use rand::Rng;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::error::FetchError;

/// Maximum length of an upstream body kept in errors and logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Upper bound of the random extra delay, as a fraction of the base delay.
const JITTER_FRACTION: f64 = 0.3;

/// Shape of the exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: true,
        }
    }
}

impl Backoff {
    // ---
    /// Un-jittered delay after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        // ---
        let exp = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exp;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay actually slept after the given failed attempt.
    pub fn sleep_for(&self, attempt: u32) -> Duration {
        // ---
        let delay = self.delay_for(attempt);
        if !self.jitter {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=JITTER_FRACTION);
        delay.mul_f64(1.0 + extra)
    }
}

/// Returns `true` if a non-success status is worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    // ---
    if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    !status.is_client_error()
}

/// Shared HTTP client wrapping `reqwest` with the retry discipline above.
#[derive(Debug, Clone)]
pub struct RetryClient {
    client: reqwest::Client,
    backoff: Backoff,
}

impl RetryClient {
    // ---
    pub fn new(backoff: Backoff) -> Result<Self, FetchError> {
        // ---
        let client = reqwest::Client::builder()
            .user_agent(concat!("hydroflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Setup {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client, backoff })
    }

    /// POST `payload` as JSON and return the decoded JSON body.
    ///
    /// `max_retries` counts the first attempt; `timeout` applies to each
    /// attempt separately.
    pub async fn call_with_retry(
        &self,
        url: &str,
        payload: &Value,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        // ---
        let response = self
            .send_with_retry(url, max_retries, || {
                self.client.post(url).timeout(timeout).json(payload)
            })
            .await?;
        decode_json(url, response).await
    }

    /// GET a JSON document, optionally with a bearer token.
    pub async fn get_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        // ---
        let response = self
            .send_with_retry(url, max_retries, || {
                let req = self.client.get(url).timeout(timeout);
                match bearer {
                    Some(token) => req.bearer_auth(token),
                    None => req,
                }
            })
            .await?;
        decode_json(url, response).await
    }

    /// GET a page as text (HTML scraping).
    pub async fn get_text(
        &self,
        url: &str,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        // ---
        let response = self
            .send_with_retry(url, max_retries, || self.client.get(url).timeout(timeout))
            .await?;
        response.text().await.map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Core retry loop. `build_request` is called once per attempt since a
    /// `RequestBuilder` is consumed by `send()`.
    async fn send_with_retry<F>(
        &self,
        url: &str,
        max_retries: u32,
        build_request: F,
    ) -> Result<Response, FetchError>
    where
        F: Fn() -> RequestBuilder,
    {
        // ---
        let max_attempts = max_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match build_request().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = preview(&response.text().await.unwrap_or_default());
                    let err = FetchError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                        body,
                        attempts: attempt,
                    };
                    if !is_retryable_status(status) {
                        tracing::warn!(url, %status, "terminal client error, not retrying");
                        return Err(err);
                    }
                    err
                }
                Err(e) if e.is_builder() => {
                    return Err(FetchError::Setup {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
                Err(e) => FetchError::NoResponse {
                    url: url.to_string(),
                    attempts: attempt,
                    source: e,
                },
            };

            if attempt >= max_attempts {
                tracing::error!(url, attempts = attempt, error = %failure, "giving up");
                return Err(failure);
            }

            let delay = self.backoff.sleep_for(attempt);
            tracing::warn!(
                "  attempt {}/{} failed ({}), retrying in {:?}",
                attempt,
                max_attempts,
                failure,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

// ---

async fn decode_json(url: &str, response: Response) -> Result<Value, FetchError> {
    // ---
    let text = response.text().await.map_err(|e| FetchError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| FetchError::Decode {
        url: url.to_string(),
        message: format!("{e}; body: {}", preview(&text)),
    })
}

fn preview(text: &str) -> String {
    if text.chars().count() > BODY_PREVIEW_LEN {
        let cut: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
