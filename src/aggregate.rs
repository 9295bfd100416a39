//! Dashboard metrics and the executive narrative.
//!
//! Metrics are plain arithmetic over the processed articles. The narrative
//! is model-written prose, but its prompt is built only from those computed
//! numbers (never from earlier model output), so every figure in it traces
//! back to [`DashboardMetrics`]. When the model ignores the "plain prose"
//! instruction or does not answer, a deterministic brief is written from
//! the same numbers instead.

use crate::api::{AskAsync, complete};
use crate::models::ProcessedArticle;
use crate::utils::format_thousands;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, instrument, warn};

/// Number of distinct days kept in [`DashboardMetrics::trend`].
const TREND_DAYS: usize = 7;

/// Currency symbols, thousands separators and stray whitespace in fines.
static FINE_NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[£$€,\s]").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    /// Bucket a free-text severity. Anything outside the vocabulary is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        // Older prompts answered "High Risk" style labels.
        match label.trim().trim_end_matches(" Risk").trim() {
            "Critical" => Severity::Critical,
            "High" => Severity::High,
            "Medium" => Severity::Medium,
            "Low" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl SeverityCounts {
    fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub incidents: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_articles: usize,
    pub severity: SeverityCounts,
    /// Critical + High.
    pub high_risk: usize,
    /// Sum of every parseable fine, in whole currency units.
    pub total_fines: u64,
    pub construction_incidents: usize,
    pub incident_types: BTreeMap<String, usize>,
    pub recent_companies: Vec<String>,
    pub trend: Vec<TrendPoint>,
}

/// Parse a fine such as `"£50,000"` into `50000`.
///
/// Returns `None` for absent or non-numeric values (`"None"`, `"Unknown"`,
/// `"undisclosed"`) and for amounts too large to count; fractional amounts
/// are rounded.
pub fn parse_fine(raw: &str) -> Option<u64> {
    let digits = FINE_NOISE.replace_all(raw, "");
    if digits.is_empty() {
        return None;
    }
    if let Ok(whole) = digits.parse::<u64>() {
        return Some(whole);
    }
    digits
        .parse::<f64>()
        .ok()
        .map(f64::round)
        .filter(|v| v.is_finite() && *v >= 0.0 && *v < u64::MAX as f64)
        .map(|v| v as u64)
}

impl DashboardMetrics {
    /// Compute every metric over `articles`. Raw-text summaries count toward
    /// the total and the `Unknown` severity bucket only.
    pub fn from_articles(articles: &[ProcessedArticle]) -> Self {
        let mut metrics = DashboardMetrics {
            total_articles: articles.len(),
            ..Default::default()
        };
        let mut daily: BTreeMap<NaiveDate, usize> = BTreeMap::new();

        for article in articles {
            *daily
                .entry(article.article.link.scraped_at.date_naive())
                .or_default() += 1;

            let Some(summary) = article.gemini_summary.structured() else {
                metrics.severity.add(Severity::Unknown);
                continue;
            };

            metrics.severity.add(Severity::from_label(&summary.severity));

            *metrics
                .incident_types
                .entry(summary.incident_type.clone())
                .or_default() += 1;

            if summary.industry.to_lowercase().contains("construction") {
                metrics.construction_incidents += 1;
            }

            if let Some(amount) = summary.fine.as_deref().and_then(parse_fine) {
                metrics.total_fines = metrics.total_fines.saturating_add(amount);
            }

            let company = summary.company.trim();
            if company != "Unknown"
                && company.chars().count() > 3
                && !metrics.recent_companies.iter().any(|c| c == company)
            {
                metrics.recent_companies.push(company.to_string());
            }
        }

        metrics.high_risk = metrics.severity.critical + metrics.severity.high;
        let skip = daily.len().saturating_sub(TREND_DAYS);
        metrics.trend = daily
            .into_iter()
            .skip(skip)
            .map(|(date, incidents)| TrendPoint { date, incidents })
            .collect();
        metrics
    }
}

/// Prompt for the executive brief, built from computed numbers only.
pub fn build_narrative_prompt(metrics: &DashboardMetrics) -> String {
    format!(
        r#"Write an executive briefing for safety managers about recent workplace incidents. Write in plain English paragraphs.

DATA SUMMARY:
- Total incidents: {total}
- High risk incidents: {high_risk} (Critical: {critical}, High: {high})
- Medium risk: {medium}
- Low risk: {low}
- Construction incidents: {construction}
- Total fines: £{fines}

Write 2-3 short paragraphs covering:
1. Current situation headline
2. Key safety concerns and trends
3. Immediate recommendations for companies

Write like you're briefing executives. Use normal business language. NO technical jargon. NO bullet points. NO JSON. Just clear, readable paragraphs.
"#,
        total = metrics.total_articles,
        high_risk = metrics.high_risk,
        critical = metrics.severity.critical,
        high = metrics.severity.high,
        medium = metrics.severity.medium,
        low = metrics.severity.low,
        construction = metrics.construction_incidents,
        fines = format_thousands(metrics.total_fines),
    )
}

/// Deterministic brief used when the model's answer is unusable.
pub fn fallback_narrative(metrics: &DashboardMetrics) -> String {
    format!(
        "Recent analysis of {} workplace incidents shows {} high-risk cases requiring immediate attention. \
         Construction remains the most affected sector with {} incidents and £{} in fines issued. \
         Companies should prioritize equipment safety training, fall protection measures, and regulatory compliance to prevent similar incidents.",
        metrics.total_articles,
        metrics.high_risk,
        metrics.construction_incidents,
        format_thousands(metrics.total_fines),
    )
}

/// True when a narrative answer came back as code or a JSON object.
pub fn looks_like_code(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with('{')
}

pub struct Aggregator<'a, A: ?Sized> {
    api: &'a A,
}

impl<'a, A> Aggregator<'a, A>
where
    A: AskAsync + ?Sized,
{
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// Write the executive brief for `metrics`.
    #[instrument(level = "info", skip_all, fields(total = metrics.total_articles))]
    pub async fn narrative(&self, metrics: &DashboardMetrics) -> String {
        if metrics.total_articles == 0 {
            info!("No processed articles; using deterministic brief");
            return fallback_narrative(metrics);
        }
        match complete(self.api, &build_narrative_prompt(metrics)).await {
            Some(text) if !text.trim().is_empty() && !looks_like_code(&text) => text.trim().to_string(),
            Some(_) => {
                warn!("Narrative answer looked like code or was empty; using deterministic brief");
                fallback_narrative(metrics)
            }
            None => {
                warn!("No narrative answer; using deterministic brief");
                fallback_narrative(metrics)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedAsk;
    use crate::models::{Article, Link, ParsedSummary, Summary};
    use chrono::{Duration, Local, TimeZone};

    fn processed(severity: &str, industry: &str, fine: Option<&str>, company: &str, days_ago: i64) -> ProcessedArticle {
        let scraped_at = Local.with_ymd_and_hms(2025, 5, 20, 12, 0, 0).unwrap() - Duration::days(days_ago);
        ProcessedArticle {
            article: Article {
                link: Link {
                    title: "Incident".to_string(),
                    url: format!("https://example.com/{severity}/{days_ago}/{company}"),
                    source: "hse-press".to_string(),
                    scraped_at,
                },
                content: Some("Body".to_string()),
            },
            gemini_summary: ParsedSummary::Structured(Summary {
                incident_type: "Injury".to_string(),
                severity: severity.to_string(),
                industry: industry.to_string(),
                company: company.to_string(),
                location: "Leeds".to_string(),
                summary: "Something happened.".to_string(),
                fine: fine.map(str::to_string),
                lesson: "Be careful.".to_string(),
            }),
            processed_at: scraped_at,
        }
    }

    fn raw(days_ago: i64) -> ProcessedArticle {
        let mut article = processed("High", "Construction", None, "Unknown", days_ago);
        article.gemini_summary = ParsedSummary::RawText {
            raw_summary: "garbled".to_string(),
        };
        article
    }

    #[test]
    fn test_parse_fine() {
        assert_eq!(parse_fine("£50,000"), Some(50_000));
        assert_eq!(parse_fine("£1,234,567"), Some(1_234_567));
        assert_eq!(parse_fine(" $2500 "), Some(2_500));
        assert_eq!(parse_fine("£12,500.60"), Some(12_501));
        assert_eq!(parse_fine("None"), None);
        assert_eq!(parse_fine("Unknown"), None);
        assert_eq!(parse_fine("£"), None);
        assert_eq!(parse_fine(""), None);
        assert_eq!(parse_fine("£1e30"), None);
    }

    #[test]
    fn test_fine_total_survives_huge_amounts() {
        let articles = vec![
            processed("High", "Construction", Some("£1e30"), "Acme Ltd", 0),
            processed("High", "Construction", Some("£50,000"), "Acme Ltd", 0),
        ];
        assert_eq!(DashboardMetrics::from_articles(&articles).total_fines, 50_000);

        let articles = vec![
            processed("High", "Construction", Some("£18,446,744,073,709,551,615"), "Acme Ltd", 0),
            processed("High", "Construction", Some("£50,000"), "Acme Ltd", 0),
        ];
        assert_eq!(DashboardMetrics::from_articles(&articles).total_fines, u64::MAX);
    }

    #[test]
    fn test_severity_buckets() {
        assert_eq!(Severity::from_label("Critical"), Severity::Critical);
        assert_eq!(Severity::from_label("High Risk"), Severity::High);
        assert_eq!(Severity::from_label(" Low "), Severity::Low);
        assert_eq!(Severity::from_label("Catastrophic"), Severity::Unknown);
        assert_eq!(Severity::from_label("medium"), Severity::Unknown);
    }

    #[test]
    fn test_metrics() {
        let articles = vec![
            processed("Critical", "Construction", Some("£50,000"), "Acme Ltd", 0),
            processed("High", "construction (civil)", Some("None"), "Acme Ltd", 1),
            processed("Medium", "Manufacturing", None, "ABC", 1),
            processed("Severe", "Energy", Some("£1,500"), "PowerGen plc", 2),
            raw(3),
        ];
        let metrics = DashboardMetrics::from_articles(&articles);

        assert_eq!(metrics.total_articles, 5);
        assert_eq!(
            metrics.severity,
            SeverityCounts {
                critical: 1,
                high: 1,
                medium: 1,
                low: 0,
                unknown: 2,
            }
        );
        assert_eq!(metrics.high_risk, 2);
        assert_eq!(metrics.total_fines, 51_500);
        assert_eq!(metrics.construction_incidents, 2);
        assert_eq!(metrics.incident_types.get("Injury"), Some(&4));
        assert_eq!(metrics.recent_companies, vec!["Acme Ltd", "PowerGen plc"]);
        let counts: Vec<usize> = metrics.trend.iter().map(|p| p.incidents).collect();
        assert_eq!(counts, vec![1, 1, 2, 1]);
    }

    #[test]
    fn test_trend_keeps_last_seven_days() {
        let articles: Vec<_> = (0..10)
            .map(|d| processed("Low", "General", None, "Unknown", d))
            .collect();
        let metrics = DashboardMetrics::from_articles(&articles);
        assert_eq!(metrics.trend.len(), 7);
        assert_eq!(
            metrics.trend.last().unwrap().date,
            NaiveDate::from_ymd_opt(2025, 5, 20).unwrap()
        );
    }

    #[test]
    fn test_prompt_is_built_from_numbers_only() {
        let articles = vec![processed("Critical", "Construction", Some("£50,000"), "Acme Ltd", 0)];
        let metrics = DashboardMetrics::from_articles(&articles);
        let prompt = build_narrative_prompt(&metrics);
        assert!(prompt.contains("- Total incidents: 1"));
        assert!(prompt.contains("High risk incidents: 1 (Critical: 1, High: 0)"));
        assert!(prompt.contains("Total fines: £50,000"));
        assert!(!prompt.contains("Something happened."));
        assert!(!prompt.contains("Acme Ltd"));
    }

    #[test]
    fn test_looks_like_code() {
        assert!(looks_like_code("```json\n{}\n```"));
        assert!(looks_like_code("  {\"brief\": \"x\"}"));
        assert!(!looks_like_code("Recent incidents show..."));
    }

    #[tokio::test]
    async fn test_narrative_uses_model_prose() {
        let api = ScriptedAsk::always("  Inspectors recorded one critical incident.  ");
        let metrics = DashboardMetrics::from_articles(&[processed("Critical", "Construction", None, "Acme Ltd", 0)]);
        let text = Aggregator::new(&api).narrative(&metrics).await;
        assert_eq!(text, "Inspectors recorded one critical incident.");
    }

    #[tokio::test]
    async fn test_narrative_falls_back_on_json_answer() {
        let api = ScriptedAsk::always("{\"headline\": \"Bad\"}");
        let articles = vec![
            processed("Critical", "Construction", Some("£50,000"), "Acme Ltd", 0),
            processed("High", "Mining", Some("£2,000"), "Deep Mines", 0),
        ];
        let metrics = DashboardMetrics::from_articles(&articles);
        let text = Aggregator::new(&api).narrative(&metrics).await;
        assert_eq!(text, fallback_narrative(&metrics));
        assert!(text.contains("2 workplace incidents"));
        assert!(text.contains("2 high-risk cases"));
        assert!(text.contains("£52,000"));
    }

    #[tokio::test]
    async fn test_narrative_falls_back_without_answer() {
        let api = ScriptedAsk::new(vec![Ok(None)]);
        let metrics = DashboardMetrics::from_articles(&[processed("Low", "General", None, "Unknown", 0)]);
        let text = Aggregator::new(&api).narrative(&metrics).await;
        assert_eq!(text, fallback_narrative(&metrics));
    }

    #[tokio::test]
    async fn test_empty_dataset_skips_model() {
        let api = ScriptedAsk::always("prose");
        let metrics = DashboardMetrics::from_articles(&[]);
        let text = Aggregator::new(&api).narrative(&metrics).await;
        assert!(text.starts_with("Recent analysis of 0 workplace incidents"));
        assert_eq!(api.calls(), 0);
    }
}
