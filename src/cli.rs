//! Command-line interface definitions for Safety News Digest.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. The model API key can come from a flag, the environment, or a
//! `.env` file loaded before parsing.

use clap::{Parser, Subcommand};

/// Command-line arguments for the Safety News Digest application.
///
/// # Examples
///
/// ```sh
/// # Scrape every registered source into ./data
/// safety_news_digest scrape
///
/// # Summarize the latest scrape, at most 20 articles
/// GEMINI_API_KEY=... safety_news_digest process --max-articles 20
///
/// # Scrape, then process, with a YAML config
/// safety_news_digest -c digest.yaml run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Directory for scraped and processed datasets (overrides the config file)
    #[arg(short, long)]
    pub data_dir: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scrape all configured sources and write a scraped dataset
    Scrape,

    /// Summarize the latest scraped dataset and write a processed dataset
    Process {
        /// Upper bound on articles sent to the model (defaults to the config value)
        #[arg(short, long)]
        max_articles: Option<usize>,
    },

    /// Scrape, then process the fresh dataset if scraping succeeded
    Run {
        #[arg(short, long)]
        max_articles: Option<usize>,
    },

    /// Check that the model endpoint answers
    Check,

    /// Print metrics and the executive brief of the latest processed dataset
    Report,

    /// List the registered news sources
    Sources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "safety_news_digest",
            "--data-dir",
            "./out",
            "process",
            "--max-articles",
            "25",
        ]);

        assert_eq!(cli.data_dir.as_deref(), Some("./out"));
        assert_eq!(
            cli.command,
            Command::Process {
                max_articles: Some(25)
            }
        );
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["safety_news_digest", "-c", "/etc/digest.yaml", "-d", "/tmp/data", "run", "-m", "3"]);

        assert_eq!(cli.config.as_deref(), Some("/etc/digest.yaml"));
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/data"));
        assert_eq!(cli.command, Command::Run { max_articles: Some(3) });
    }

    #[test]
    fn test_cli_api_key_flag() {
        let cli = Cli::parse_from(["safety_news_digest", "--gemini-api-key", "k-123", "check"]);
        assert_eq!(cli.gemini_api_key.as_deref(), Some("k-123"));
        assert_eq!(cli.command, Command::Check);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["safety_news_digest"]).is_err());
    }
}
