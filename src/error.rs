//! Error types for the scrape → summarize → aggregate pipeline.
//!
//! Network-level failures are retried where they occur and degrade to
//! "unavailable" (`None`) at the component boundary. Only job-level
//! failures ([`PipelineError`]) and start rejections ([`StartError`])
//! surface to the caller.

use crate::jobs::JobKind;
use thiserror::Error;

/// A single failed page fetch. Always transient from the fetcher's view.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),
}

/// A single failed request to the text-generation endpoint.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("rate limited by the generation endpoint")]
    RateLimited,

    #[error("generation endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited)
    }
}

/// Why a source could not be scraped. The run logs it and moves on.
#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("main page {0} could not be fetched")]
    Unavailable(String),

    #[error("invalid source url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// A job-level failure. Recorded on the job status as a human-readable message.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    MissingPrerequisite(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML write error: {0}")]
    XmlSerialize(#[from] quick_xml::SeError),

    #[error("XML read error: {0}")]
    XmlDeserialize(#[from] quick_xml::DeError),

    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(String),
}

/// An advisory rejection of a start request. Not a job failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("{0} already in progress")]
    AlreadyRunning(JobKind),

    #[error("another task is already running")]
    Busy,
}
