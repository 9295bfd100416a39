//! # Safety News Digest
//!
//! Scrapes workplace health-and-safety news, distills each incident into a
//! fixed eight-field record with a Gemini model, and aggregates the results
//! into dashboard metrics and an executive brief.
//!
//! ## Usage
//!
//! ```sh
//! safety_news_digest scrape
//! safety_news_digest process --max-articles 10
//! safety_news_digest run
//! safety_news_digest report
//! ```
//!
//! ## Architecture
//!
//! 1. **Scraping**: per-source extractors discover article links; bodies are
//!    fetched and reduced to readable text; the run is saved as XML and JSON
//! 2. **Processing**: each article with a body is summarized by the model;
//!    undecodable answers are kept as raw text
//! 3. **Aggregation**: metrics are computed from the summaries and the model
//!    writes a brief from those numbers only
//!
//! Stages run as background jobs behind an orchestrator with single-flight
//! starts; the CLI follows their progress as an observer.

use clap::Parser;
use std::error::Error;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregate;
mod api;
mod cli;
mod config;
mod error;
mod fetch;
mod jobs;
mod models;
mod outputs;
mod parser;
mod pipeline;
mod scrape;
mod scrapers;
mod summarize;
mod utils;

use aggregate::{Aggregator, DashboardMetrics};
use api::{GeminiClient, RetryAsk, check_connection};
use cli::{Cli, Command};
use config::{Config, GeminiConfig, load_config};
use error::StartError;
use fetch::{Fetcher, HttpPageFetch};
use jobs::{JobKind, JobStatus, Orchestrator};
use outputs::DataStore;
use pipeline::{NO_API_KEY, Pipeline, ProcessSettings};
use scrape::{ScrapeSettings, Scraper};
use scrapers::{SOURCES, select_sources};
use utils::ensure_writable_dir;

type LiveOrchestrator = Orchestrator<Pipeline<HttpPageFetch, RetryAsk<GeminiClient>>>;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    info!("safety_news_digest starting up");

    let args = Cli::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    debug!(data_dir = %config.data_dir, command = ?args.command, "Resolved configuration");

    let api_key = args.gemini_api_key;
    let result = match args.command {
        Command::Sources => {
            list_sources();
            Ok(())
        }
        Command::Check => check(&config, api_key).await,
        Command::Report => report(&config, api_key).await,
        Command::Scrape => run_jobs(&config, api_key, &[JobKind::Scrape], |o| o.start_scrape()).await,
        Command::Process { max_articles } => {
            let max = max_articles.unwrap_or(config.process.default_max_articles);
            run_jobs(&config, api_key, &[JobKind::Process], |o| o.start_process(max)).await
        }
        Command::Run { max_articles } => {
            let max = max_articles.unwrap_or(config.process.default_max_articles);
            run_jobs(&config, api_key, &[JobKind::Scrape, JobKind::Process], |o| {
                o.start_combined(max)
            })
            .await
        }
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(elapsed_secs = elapsed.as_secs_f64(), "Done"),
        Err(e) => error!(elapsed_secs = elapsed.as_secs_f64(), error = %e, "Finished with errors"),
    }
    result
}

/// Build the retrying model client, or `None` when no key is available.
fn build_llm(config: &GeminiConfig, api_key: Option<String>) -> Result<Option<RetryAsk<GeminiClient>>, Box<dyn Error>> {
    let Some(key) = api_key.filter(|k| !k.trim().is_empty()) else {
        warn!("GEMINI_API_KEY not set; processing and narrative generation are unavailable");
        return Ok(None);
    };
    info!(model = %config.model, key_chars = key.len(), "Model client configured");
    let client = GeminiClient::new(config, key)?;
    Ok(Some(RetryAsk::new(client, config.max_attempts, Duration::from_secs(1))))
}

fn build_orchestrator(config: &Config, api_key: Option<String>) -> Result<LiveOrchestrator, Box<dyn Error>> {
    let sources = select_sources(&config.scrape.sources);
    if sources.is_empty() {
        return Err(format!("no registered source matches {:?}", config.scrape.sources).into());
    }
    let fetcher = Fetcher::new(
        HttpPageFetch::new(Duration::from_secs(config.scrape.timeout_secs))?,
        config.scrape.max_retries,
    );
    let scraper = Scraper::new(fetcher, sources, ScrapeSettings::from(&config.scrape));
    let pipeline = Pipeline::new(
        scraper,
        build_llm(&config.gemini, api_key)?,
        DataStore::new(&config.data_dir),
        ProcessSettings::from(&config.process),
    );
    Ok(Orchestrator::new(pipeline, config.process.chain_pause()))
}

/// Start a job, follow it to completion, and print the final status.
///
/// Fails when any job in `expected` did not finish successfully.
#[instrument(level = "info", skip_all, fields(jobs = ?expected))]
async fn run_jobs<F>(
    config: &Config,
    api_key: Option<String>,
    expected: &[JobKind],
    start: F,
) -> Result<(), Box<dyn Error>>
where
    F: FnOnce(&LiveOrchestrator) -> Result<JoinHandle<()>, StartError>,
{
    if let Err(e) = ensure_writable_dir(&config.data_dir).await {
        error!(
            path = %config.data_dir,
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let orchestrator = build_orchestrator(config, api_key)?;
    let scraping = orchestrator.registry().scraping.subscribe();
    let processing = orchestrator.registry().processing.subscribe();

    let handle = start(&orchestrator)?;
    follow_progress(handle, scraping, processing).await?;

    let snapshot = orchestrator.status();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    for &kind in expected {
        let status = orchestrator.registry().tracker(kind).snapshot();
        if !status.is_done() {
            return Err(format!("{kind} did not complete: {}", status.message).into());
        }
    }
    Ok(())
}

/// Log every status change until the job task exits.
async fn follow_progress(
    mut handle: JoinHandle<()>,
    mut scraping: watch::Receiver<JobStatus>,
    mut processing: watch::Receiver<JobStatus>,
) -> Result<(), Box<dyn Error>> {
    loop {
        tokio::select! {
            joined = &mut handle => {
                joined?;
                return Ok(());
            }
            Ok(()) = scraping.changed() => {
                let status = scraping.borrow_and_update().clone();
                log_status(JobKind::Scrape, &status);
            }
            Ok(()) = processing.changed() => {
                let status = processing.borrow_and_update().clone();
                log_status(JobKind::Process, &status);
            }
        }
    }
}

fn log_status(kind: JobKind, status: &JobStatus) {
    info!(
        job = %kind,
        running = status.running,
        progress = status.progress,
        message = %status.message,
        "Job status"
    );
}

fn list_sources() {
    for source in SOURCES {
        let pages = if source.pages.is_empty() {
            "main page".to_string()
        } else {
            format!("pages {:?}", source.pages)
        };
        println!("{:<18} {:<22} {} ({pages})", source.id(), source.name, source.url);
    }
}

#[instrument(level = "info", skip_all)]
async fn check(config: &Config, api_key: Option<String>) -> Result<(), Box<dyn Error>> {
    let Some(llm) = build_llm(&config.gemini, api_key)? else {
        return Err(NO_API_KEY.into());
    };
    if check_connection(&llm).await {
        println!("API connection successful ({})", config.gemini.model);
        Ok(())
    } else {
        Err(format!("model endpoint {} did not pass the connection check", config.gemini.model).into())
    }
}

/// Print metrics and the brief of the most recent processed dataset.
#[instrument(level = "info", skip_all)]
async fn report(config: &Config, api_key: Option<String>) -> Result<(), Box<dyn Error>> {
    let store = DataStore::new(&config.data_dir);
    let Some(dataset) = store.latest_processed().await? else {
        println!("no data yet");
        return Ok(());
    };

    let metrics = DashboardMetrics::from_articles(&dataset.articles);
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    let narrative = match dataset.dashboard_summary {
        Some(text) => text,
        None => match build_llm(&config.gemini, api_key)? {
            Some(llm) => Aggregator::new(&llm).narrative(&metrics).await,
            None => aggregate::fallback_narrative(&metrics),
        },
    };
    println!("\n{narrative}");
    Ok(())
}
