//! Per-article incident summarization.

use crate::api::{AskAsync, complete};
use crate::models::{Article, ParsedSummary};
use crate::parser::parse_summary;
use crate::utils::{take_chars, truncate_for_log};
use tracing::{info, instrument, warn};

pub const INCIDENT_TYPES: &[&str] = &[
    "Fatality", "Injury", "Fine", "Fire", "Chemical", "Equipment", "Fall", "Guidance",
];
pub const SEVERITIES: &[&str] = &["Critical", "High", "Medium", "Low"];
pub const INDUSTRIES: &[&str] = &[
    "Construction",
    "Manufacturing",
    "Healthcare",
    "Mining",
    "Transport",
    "Energy",
    "General",
];

/// Build the summarization prompt for one article.
pub fn build_prompt(title: &str, content: &str, excerpt_chars: usize) -> String {
    format!(
        r#"You are analyzing a workplace safety incident. Return ONLY clean JSON with these exact field names.

TITLE: {title}
CONTENT: {excerpt}

Return exactly this format with NO extra text, NO markdown, NO code blocks:

{{"type": "Fatality", "severity": "Critical", "industry": "Construction", "company": "Company Name", "location": "Location", "summary": "Plain English summary", "fine": "£50000", "lesson": "Safety lesson"}}

Rules:
- type: ONLY use {types}
- severity: ONLY use {severities}
- industry: ONLY use {industries}
- company: actual company name or "Unknown"
- location: actual location or "Unknown"
- summary: 1-2 sentences in plain English
- fine: amount like "£50000" or "None"
- lesson: what to learn from this

Return ONLY the JSON object. Nothing else.
"#,
        excerpt = take_chars(content, excerpt_chars),
        types = INCIDENT_TYPES.join(", "),
        severities = SEVERITIES.join(", "),
        industries = INDUSTRIES.join(", "),
    )
}

pub struct Summarizer<'a, A: ?Sized> {
    api: &'a A,
    excerpt_chars: usize,
}

impl<'a, A> Summarizer<'a, A>
where
    A: AskAsync + ?Sized,
{
    pub fn new(api: &'a A, excerpt_chars: usize) -> Self {
        Self { api, excerpt_chars }
    }

    /// Summarize one article.
    ///
    /// Returns `None` when the article has no body (the model is not
    /// contacted) or when the model gave no answer. Undecodable answers are
    /// returned as [`ParsedSummary::RawText`].
    #[instrument(level = "info", skip_all, fields(url = %article.link.url))]
    pub async fn summarize(&self, article: &Article) -> Option<ParsedSummary> {
        let Some(body) = article.body() else {
            warn!("Article has no content; not summarizing");
            return None;
        };
        let prompt = build_prompt(&article.link.title, body, self.excerpt_chars);
        let raw = complete(self.api, &prompt).await?;
        info!(response_preview = %truncate_for_log(&raw, 120), "Model answered");
        Some(parse_summary(&raw))
    }
}
