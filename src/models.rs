//! Data models for scraped links, articles, and their processed representations.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Link`]: A candidate article link discovered on a source's listing page
//! - [`Article`]: A link plus its (optional) extracted body text
//! - [`Summary`]: The fixed eight-field incident record produced by the model
//! - [`ParsedSummary`]: Tagged result of decoding untrusted model text
//! - [`ProcessedArticle`]: An article with its summary attached
//! - [`ScrapedDataset`] / [`ProcessedDataset`]: The two persisted artifacts
//!
//! The JSON field names match the files consumed by the dashboard, hence the
//! occasional `#[serde(rename)]`.

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A candidate article link extracted from a source page.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Link {
    pub title: String,
    pub url: String,
    /// Identifier of the registered source that produced the link.
    pub source: String,
    pub scraped_at: DateTime<Local>,
}

/// A news item's metadata plus its optional full-text body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    #[serde(flatten)]
    pub link: Link,
    #[serde(default)]
    pub content: Option<String>,
}

impl Article {
    /// Body text, if present and not blank.
    pub fn body(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// The eight-field structured distillation of an incident article.
///
/// `type`, `severity` and `industry` are requested from closed vocabularies
/// but whatever the model returns is kept verbatim; bucketing happens at
/// aggregation time. Any field the model leaves out takes its default, so a
/// partial object still decodes.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Summary {
    #[serde(rename = "type", default = "unknown")]
    pub incident_type: String,
    #[serde(default = "unknown")]
    pub severity: String,
    #[serde(default = "unknown")]
    pub industry: String,
    #[serde(default = "unknown")]
    pub company: String,
    #[serde(default = "unknown")]
    pub location: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, deserialize_with = "fine_from_any")]
    pub fine: Option<String>,
    #[serde(default)]
    pub lesson: String,
}

fn unknown() -> String {
    "Unknown".to_string()
}

/// Models sometimes emit the fine as a bare number instead of a string.
fn fine_from_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Result of decoding model output: a structured record, or the raw text
/// when the output could not be decoded.
///
/// `RawText` is listed first so that untagged deserialization of a stored
/// `{"raw_summary": ..}` object never falls through to `Structured`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParsedSummary {
    RawText { raw_summary: String },
    Structured(Summary),
}

impl ParsedSummary {
    pub fn structured(&self) -> Option<&Summary> {
        match self {
            ParsedSummary::Structured(s) => Some(s),
            ParsedSummary::RawText { .. } => None,
        }
    }
}

/// An article that went through the summarizer. Only exists for articles
/// with non-empty content.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProcessedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub gemini_summary: ParsedSummary,
    pub processed_at: DateTime<Local>,
}

/// Output of one scrape run: every discovered link plus the bodies that
/// were fetched, keyed by URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedDataset {
    pub scraped_at: DateTime<Local>,
    pub links: Vec<Link>,
    pub content: BTreeMap<String, String>,
}

impl ScrapedDataset {
    /// Join links with their fetched bodies, preserving link order.
    pub fn articles(&self) -> Vec<Article> {
        self.links
            .iter()
            .map(|link| Article {
                link: link.clone(),
                content: self.content.get(&link.url).cloned(),
            })
            .collect()
    }
}

/// Output of one process run, as read by the dashboard.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProcessedDataset {
    pub processed_at: DateTime<Local>,
    /// Number of articles in the scraped dataset the run read from.
    pub total_articles: usize,
    /// Number of articles that made it into `articles`.
    pub processed_articles: usize,
    pub dashboard_summary: Option<String>,
    pub articles: Vec<ProcessedArticle>,
}
