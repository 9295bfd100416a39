//! Generative-text API interaction with exponential backoff retry logic.
//!
//! This module talks to a Gemini-style `generateContent` endpoint. It
//! includes automatic retry logic with exponential backoff and jitter to
//! handle rate limiting and transient failures gracefully.
//!
//! # Architecture
//!
//! - [`AskAsync`]: Core trait defining one prompt → answer exchange
//! - [`GeminiClient`]: A single HTTP attempt against the REST endpoint
//! - [`RetryAsk`]: Decorator that adds retry logic to any `AskAsync` implementation
//! - [`complete`]: Boundary helper that degrades every failure to `None`
//!
//! # Wire Contract
//!
//! Request: `{"contents":[{"parts":[{"text": prompt}]}]}`.
//! Response text lives at `candidates[0].content.parts[0].text`; a missing
//! segment anywhere along that path is an empty answer, not an error.
//!
//! # Retry Strategy
//!
//! - A shared budget of attempts (3 by default) covers rate limiting (429),
//!   other non-200 statuses, and transport errors alike
//! - After failed attempt `n` (0-based) the client sleeps `2^n` seconds plus
//!   0–250ms of jitter; the final failure is not followed by a sleep

use crate::config::GeminiConfig;
use crate::error::LlmError;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use rand::{Rng, rng};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Trait for one prompt → answer exchange with a text-generation model.
///
/// `Ok(None)` means the model answered without any text, which callers
/// treat as "no answer" rather than a failure.
#[async_trait]
pub trait AskAsync: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<Option<String>, LlmError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn single(prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        }
    }
}

/// Pull the answer text out of a `generateContent` response body.
pub fn extract_answer(body: &Value) -> Option<String> {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// A single request against the Gemini REST API.
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, api_key: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            urlencoding::encode(&config.model)
        );
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl AskAsync for GeminiClient {
    #[instrument(level = "debug", skip_all)]
    async fn ask(&self, prompt: &str) -> Result<Option<String>, LlmError> {
        let t0 = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-goog-api-key", &self.api_key)
            .json(&GenerateRequest::single(prompt))
            .send()
            .await?;
        let status = response.status();
        debug!(%status, elapsed_ms = t0.elapsed().as_millis() as u64, "Generation response");

        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 500),
            });
        }

        match response.json::<Value>().await {
            Ok(body) => {
                let answer = extract_answer(&body);
                if answer.is_none() {
                    warn!("No text found in response");
                }
                Ok(answer)
            }
            Err(e) => {
                warn!(error = %e, "Response body was not JSON; treating as no answer");
                Ok(None)
            }
        }
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// ```text
/// delay(n) = base_delay * 2^n + random_jitter(0..=250ms)
/// ```
pub struct RetryAsk<T> {
    /// The underlying client to wrap.
    inner: T,
    /// Total attempts, first try included.
    max_attempts: u32,
    /// Delay after the first failure (doubles with each attempt).
    base_delay: StdDuration,
    /// Upper bound of the random jitter added to each delay.
    max_jitter_ms: u64,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Create a new retry wrapper around an existing [`AskAsync`] implementation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let client = GeminiClient::new(&config.gemini, api_key)?;
    /// let retry_client = RetryAsk::new(client, 3, Duration::from_secs(1));
    /// ```
    pub fn new(inner: T, max_attempts: u32, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_jitter_ms: 250,
        }
    }

    fn backoff(&self, attempt: u32) -> StdDuration {
        let delay = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms: u64 = if self.max_jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=self.max_jitter_ms)
        };
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}

#[async_trait]
impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    #[instrument(level = "info", skip_all)]
    async fn ask(&self, prompt: &str) -> Result<Option<String>, LlmError> {
        let total_t0 = Instant::now();
        let mut attempt = 0u32;

        loop {
            match self.inner.ask(prompt).await {
                Ok(answer) => return Ok(answer),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt - 1);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        rate_limited = e.is_rate_limit(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Send `prompt` and return the answer text, or `None` on any failure.
///
/// This is the boundary used by the summarizer and the aggregator: an
/// exhausted retry budget is logged and becomes "no answer".
#[instrument(level = "info", skip_all)]
pub async fn complete<A>(api: &A, prompt: &str) -> Option<String>
where
    A: AskAsync + ?Sized,
{
    let t0 = Instant::now();
    match api.ask(prompt).await {
        Ok(answer) => {
            info!(
                elapsed_ms_total = t0.elapsed().as_millis() as u64,
                answered = answer.is_some(),
                "complete() finished"
            );
            answer
        }
        Err(e) => {
            error!(elapsed_ms_total = t0.elapsed().as_millis() as u64, error = %e, "complete() failed");
            None
        }
    }
}

/// Prompt used by [`check_connection`].
pub const PROBE_PROMPT: &str = "Respond with exactly: 'API connection successful'";

/// Round-trip a fixed probe prompt. Any answer mentioning "successful"
/// counts as a working connection.
#[instrument(level = "info", skip_all)]
pub async fn check_connection<A>(api: &A) -> bool
where
    A: AskAsync + ?Sized,
{
    match complete(api, PROBE_PROMPT).await {
        Some(answer) if answer.to_lowercase().contains("successful") => {
            info!("Model connection check passed");
            true
        }
        Some(answer) => {
            warn!(answer = %truncate_for_log(&answer, 200), "Unexpected probe answer");
            false
        }
        None => false,
    }
}
