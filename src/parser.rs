//! Decoding of untrusted, non-deterministic model output.
//!
//! Models are told to answer with a bare JSON object but regularly wrap it
//! in a Markdown code fence and append commentary. The parser unwraps the
//! fence, decodes what is left, and never fails: text that does not decode
//! is kept verbatim as [`ParsedSummary::RawText`].

use crate::models::{ParsedSummary, Summary};
use crate::utils::{looks_truncated, truncate_for_log};
use serde::de::Error as _;
use tracing::{debug, warn};

const FENCE: &str = "```";

/// Strip a leading code fence, keeping only the embedded object.
///
/// When the trimmed text opens with a fence, every line before the first
/// line starting with `{` is dropped, and collection stops after the first
/// subsequent line ending with `}`. Anything else is returned trimmed.
pub fn unwrap_fenced(raw: &str) -> String {
    let cleaned = raw.trim();
    if !cleaned.starts_with(FENCE) {
        return cleaned.to_string();
    }

    let mut json_lines = Vec::new();
    let mut in_json = false;
    for line in cleaned.lines() {
        let stripped = line.trim();
        if stripped.starts_with('{') {
            in_json = true;
        }
        if in_json {
            json_lines.push(line);
            if stripped.ends_with('}') {
                break;
            }
        }
    }
    json_lines.join("\n")
}

/// Decode raw model text into a summary, falling back to the raw text.
pub fn parse_summary(raw: &str) -> ParsedSummary {
    let candidate = unwrap_fenced(raw);
    let decoded = serde_json::from_str::<serde_json::Value>(&candidate).and_then(|value| {
        if value.is_object() {
            serde_json::from_value::<Summary>(value)
        } else {
            Err(serde_json::Error::custom("expected a JSON object"))
        }
    });
    match decoded {
        Ok(summary) => {
            debug!(severity = %summary.severity, "Decoded structured summary");
            ParsedSummary::Structured(summary)
        }
        Err(e) => {
            warn!(
                error = %e,
                truncated = looks_truncated(&e),
                response_preview = %truncate_for_log(raw, 300),
                "Model returned non-conforming JSON; keeping raw text"
            );
            ParsedSummary::RawText {
                raw_summary: raw.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBJECT: &str = r#"{"type":"Injury","severity":"Medium","industry":"Construction","company":"Acme Ltd","location":"Leeds","summary":"A worker broke an arm.","fine":"£50,000","lesson":"Guard machinery."}"#;

    #[test]
    fn test_fenced_object_with_trailing_prose() {
        let raw = format!("```json\n{OBJECT}\n```\nNote: the fine was reported by HSE.");
        assert_eq!(unwrap_fenced(&raw), OBJECT);

        let ParsedSummary::Structured(summary) = parse_summary(&raw) else {
            panic!("expected a structured summary");
        };
        assert_eq!(summary.incident_type, "Injury");
        assert_eq!(summary.severity, "Medium");
        assert_eq!(summary.company, "Acme Ltd");
        assert_eq!(summary.fine.as_deref(), Some("£50,000"));
    }

    #[test]
    fn test_multiline_fenced_object() {
        let raw = "```\n{\n  \"type\": \"Fall\",\n  \"severity\": \"High\",\n  \"summary\": \"Fell.\"\n}\n```";
        let parsed = parse_summary(raw);
        assert_eq!(parsed.structured().unwrap().incident_type, "Fall");
    }

    #[test]
    fn test_bare_object_passes_through() {
        assert_eq!(unwrap_fenced(&format!("  {OBJECT}\n")), OBJECT);
        assert!(parse_summary(OBJECT).structured().is_some());
    }

    #[test]
    fn test_unparseable_text_is_kept() {
        let raw = "I'm sorry, I can't summarise this article.";
        assert_eq!(
            parse_summary(raw),
            ParsedSummary::RawText {
                raw_summary: raw.to_string()
            }
        );
    }

    #[test]
    fn test_truncated_object_is_kept_raw() {
        let raw = "```json\n{\"type\": \"Fire\", \"severity\": \"Hi";
        assert!(matches!(parse_summary(raw), ParsedSummary::RawText { .. }));
    }

    #[test]
    fn test_partial_object_is_structured() {
        let raw = r#"{"type":"Injury","severity":"Critical","industry":"Construction","fine":"£10,000"}"#;
        let ParsedSummary::Structured(summary) = parse_summary(raw) else {
            panic!("expected a structured summary");
        };
        assert_eq!(summary.severity, "Critical");
        assert_eq!(summary.company, "Unknown");
        assert_eq!(summary.summary, "");
        assert_eq!(summary.fine.as_deref(), Some("£10,000"));

        let parsed = parse_summary(r#"{"severity":"High","summary":"Fell."}"#);
        assert_eq!(parsed.structured().unwrap().incident_type, "Unknown");
    }

    #[test]
    fn test_non_object_json_is_kept_raw() {
        assert!(matches!(parse_summary("[]"), ParsedSummary::RawText { .. }));
        assert!(matches!(parse_summary("\"Injury\""), ParsedSummary::RawText { .. }));
    }

    #[test]
    fn test_fence_without_object() {
        assert_eq!(unwrap_fenced("```\nno json here\n```"), "");
    }
}
