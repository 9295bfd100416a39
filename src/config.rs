//! Runtime configuration loaded from an optional YAML file.
//!
//! Every field has a default, so an absent file or a partial file is valid.
//! Secrets (the model API key) never live here; they come from the
//! environment or the command line.
//!
//! ```yaml
//! data_dir: ./data
//! gemini:
//!   model: gemini-2.0-flash
//! scrape:
//!   max_articles_per_site: 5
//!   sources: [hse-press, hse-network]
//! process:
//!   default_max_articles: 20
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Where scraped and processed datasets are written and looked up.
    pub data_dir: String,
    pub gemini: GeminiConfig,
    pub scrape: ScrapeConfig,
    pub process: ProcessConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
            gemini: GeminiConfig::default(),
            scrape: ScrapeConfig::default(),
            process: ProcessConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Total attempts per prompt, rate-limit retries included.
    pub max_attempts: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub fetch_content: bool,
    pub max_articles_per_site: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub page_delay_ms: u64,
    pub article_delay_ms: u64,
    pub site_delay_ms: u64,
    /// Restrict the run to these source ids. Empty means every registered source.
    pub sources: Vec<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            fetch_content: true,
            max_articles_per_site: 10,
            max_retries: 3,
            timeout_secs: 15,
            page_delay_ms: 1_000,
            article_delay_ms: 2_000,
            site_delay_ms: 3_000,
            sources: Vec::new(),
        }
    }
}

impl ScrapeConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn article_delay(&self) -> Duration {
        Duration::from_millis(self.article_delay_ms)
    }

    pub fn site_delay(&self) -> Duration {
        Duration::from_millis(self.site_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub default_max_articles: usize,
    pub article_delay_ms: u64,
    /// Pause between the scrape and process stages of the combined workflow.
    pub chain_pause_ms: u64,
    pub content_excerpt_chars: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            default_max_articles: 10,
            article_delay_ms: 1_000,
            chain_pause_ms: 2_000,
            content_excerpt_chars: 2_500,
        }
    }
}

impl ProcessConfig {
    pub fn article_delay(&self) -> Duration {
        Duration::from_millis(self.article_delay_ms)
    }

    pub fn chain_pause(&self) -> Duration {
        Duration::from_millis(self.chain_pause_ms)
    }
}

/// Load configuration from `path`, or defaults when no path is given.
#[instrument(level = "info")]
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn Error>> {
    let Some(path) = path else {
        info!("No config file given; using defaults");
        return Ok(Config::default());
    };
    let raw = std::fs::read_to_string(Path::new(path))?;
    let config: Config = serde_yaml::from_str(&raw)?;
    info!(config_path = path, "Loaded configuration");
    Ok(config)
}
