//! Utility functions for string handling, artifact naming, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - String truncation and whitespace normalization for logging and extracted text
//! - JSON error detection for truncated model responses
//! - Thousands-separated number formatting for briefs
//! - Run timestamps embedded in artifact file names
//! - File system validation for the data directory

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Truncate a string for logging purposes.
///
/// Long strings are cut at the last character boundary at or before `max`
/// bytes, with an ellipsis and the number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Cut `s` to at most `max_chars` characters.
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When the model response is cut off (e.g., due to token limits), the
/// resulting JSON fails to parse with an EOF error.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

/// Format an integer with comma thousands separators: `1234567` → `"1,234,567"`.
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Timestamp fragment embedded in artifact names, e.g. `20250506_143000`.
pub fn run_stamp(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Create `path` if needed and prove it accepts writes by round-tripping a
/// marker file.
///
/// # Errors
///
/// The underlying I/O error when the directory cannot be created or the
/// marker cannot be written or removed.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> io::Result<()> {
    let dir = Path::new(path);
    fs::create_dir_all(dir).await?;
    let marker = dir.join(".safety_news_digest_write_check");
    fs::write(&marker, b"ok").await?;
    fs::remove_file(&marker).await?;
    info!("Data directory is writable");
    Ok(())
}
