//! Page fetching with exponential backoff.
//!
//! - [`PageFetch`]: one attempt at downloading a page
//! - [`HttpPageFetch`]: the `reqwest` implementation, with a browser-like
//!   request profile and a per-request timeout
//! - [`Fetcher`]: retry wrapper that turns repeated failures into `None`
//!
//! # Retry Strategy
//!
//! Up to `max_retries` attempts. After failed attempt `n` (0-based) the
//! fetcher sleeps `2^n` seconds before trying again; the final failure is
//! not followed by a sleep. A `None` result means "unavailable", never a
//! fatal error.

use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// A single attempt at fetching a page body.
#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// [`PageFetch`] over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpPageFetch {
    client: reqwest::Client,
}

impl HttpPageFetch {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetch for HttpPageFetch {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(response.text().await?)
    }
}

/// Retry wrapper around any [`PageFetch`].
#[derive(Debug, Clone)]
pub struct Fetcher<T> {
    inner: T,
    max_retries: u32,
    base_delay: Duration,
}

impl<T: PageFetch> Fetcher<T> {
    /// Wrap `inner` with `max_retries` total attempts and a 1 second base delay.
    pub fn new(inner: T, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries: max_retries.max(1),
            base_delay: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Backoff before the attempt following failed attempt `attempt` (0-based).
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Fetch `url`, returning `None` once every attempt has failed.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, url: &str) -> Option<String> {
        for attempt in 0..self.max_retries {
            debug!(attempt = attempt + 1, max = self.max_retries, "Fetching page");
            match self.inner.get(url).await {
                Ok(body) => return Some(body),
                Err(e) if attempt + 1 < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(attempt = attempt + 1, ?delay, error = %e, "Fetch failed; backing off");
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(attempts = self.max_retries, error = %e, "Fetch failed after all attempts");
                }
            }
        }
        None
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StaticPages;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_target_is_retried_with_growing_delay() {
        let fetcher = Fetcher::new(StaticPages::new(), 3);
        let started = tokio::time::Instant::now();

        assert_eq!(fetcher.fetch("https://example.com/missing").await, None);

        let requests = fetcher.inner.requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        let gaps: Vec<Duration> = requests.windows(2).map(|w| w[1].1 - w[0].1).collect();
        assert_eq!(gaps, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert!(gaps[0] < gaps[1]);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_immediately() {
        let pages = StaticPages::new().with("https://example.com/", "<html></html>");
        let fetcher = Fetcher::new(pages, 3);
        let body = fetcher.fetch("https://example.com/").await;
        assert_eq!(body.as_deref(), Some("<html></html>"));
        assert_eq!(fetcher.inner.requested().len(), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let fetcher = Fetcher::new(StaticPages::new(), 5);
        assert_eq!(fetcher.backoff(0), Duration::from_secs(1));
        assert_eq!(fetcher.backoff(1), Duration::from_secs(2));
        assert_eq!(fetcher.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let fetcher = Fetcher::new(StaticPages::new(), 0);
        assert_eq!(fetcher.max_retries, 1);
    }
}
