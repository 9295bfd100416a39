//! The concrete scrape and process stages run by the job orchestrator.
//!
//! Progress milestones reported on the job tracker:
//!
//! | stage   | milestones                                                        |
//! |---------|-------------------------------------------------------------------|
//! | scrape  | 10 start · 10–80 per source · 80 saving · 100 done                 |
//! | process | 5 locate data · 10 load · 30–80 per article · 80 narrative · 90 save · 100 done |
//!
//! Processing writes its output file only after every article and the
//! narrative are ready, so a failed run leaves nothing behind.

use crate::aggregate::{Aggregator, DashboardMetrics};
use crate::api::AskAsync;
use crate::config::ProcessConfig;
use crate::error::PipelineError;
use crate::fetch::PageFetch;
use crate::jobs::{JobTracker, StageOutput, Stages};
use crate::models::{Article, ProcessedArticle, ProcessedDataset};
use crate::outputs::DataStore;
use crate::scrape::Scraper;
use crate::summarize::Summarizer;
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use chrono::Local;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

pub const NO_SCRAPED_DATA: &str = "No scraped data found. Run scraping first.";
pub const NO_API_KEY: &str =
    "GEMINI_API_KEY not found. Set it in the environment, a .env file, or pass --gemini-api-key.";

#[derive(Debug, Clone)]
pub struct ProcessSettings {
    /// Pause after each summarization request.
    pub article_delay: Duration,
    pub excerpt_chars: usize,
}

impl From<&ProcessConfig> for ProcessSettings {
    fn from(config: &ProcessConfig) -> Self {
        Self {
            article_delay: config.article_delay(),
            excerpt_chars: config.content_excerpt_chars,
        }
    }
}

pub struct Pipeline<F, A> {
    scraper: Scraper<F>,
    /// Absent when no API key was configured; processing then fails fast.
    llm: Option<A>,
    store: DataStore,
    settings: ProcessSettings,
}

impl<F, A> Pipeline<F, A>
where
    F: PageFetch,
    A: AskAsync,
{
    pub fn new(scraper: Scraper<F>, llm: Option<A>, store: DataStore, settings: ProcessSettings) -> Self {
        Self {
            scraper,
            llm,
            store,
            settings,
        }
    }

    /// Summarize the first `max_articles` articles, skipping those without a
    /// body and those the model did not answer for.
    async fn summarize_all(&self, llm: &A, articles: &[Article], max_articles: usize, job: &JobTracker) -> Vec<ProcessedArticle> {
        let summarizer = Summarizer::new(llm, self.settings.excerpt_chars);
        let batch = &articles[..articles.len().min(max_articles)];
        let mut processed = Vec::with_capacity(batch.len());

        for (i, article) in batch.iter().enumerate() {
            if article.body().is_none() {
                info!(url = %article.link.url, "Skipping article without content");
                continue;
            }
            info!(
                n = i + 1,
                total = batch.len(),
                title = %truncate_for_log(&article.link.title, 50),
                "Summarizing article"
            );
            match summarizer.summarize(article).await {
                Some(summary) => processed.push(ProcessedArticle {
                    article: article.clone(),
                    gemini_summary: summary,
                    processed_at: Local::now(),
                }),
                None => warn!(url = %article.link.url, "No summary; article left out"),
            }

            let pct = 30 + (50 * (i + 1) / batch.len()) as u8;
            job.advance(pct, format!("Processed {}/{} articles", i + 1, batch.len()));
            sleep(self.settings.article_delay).await;
        }

        info!(processed = processed.len(), "Summarization finished");
        processed
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[async_trait]
impl<F, A> Stages for Pipeline<F, A>
where
    F: PageFetch + 'static,
    A: AskAsync + 'static,
{
    #[instrument(level = "info", skip_all)]
    async fn scrape(&self, job: &JobTracker) -> Result<StageOutput, PipelineError> {
        let total = self.scraper.sources().len().max(1);
        job.advance(10, format!("Scraping {} sources...", self.scraper.sources().len()));

        let dataset = self
            .scraper
            .scrape_all(|done| {
                let pct = 10 + (70 * done / total) as u8;
                job.advance(pct, format!("Scraped {done}/{total} sources"));
            })
            .await;

        job.advance(80, "Saving scraped data...");
        let files = self.store.write_scraped(&dataset).await?;

        Ok(StageOutput {
            message: format!(
                "Scraping complete! Created {} links, {} articles",
                dataset.links.len(),
                dataset.content.len()
            ),
            files: files.iter().map(|p| p.display().to_string()).collect(),
        })
    }

    #[instrument(level = "info", skip(self, job))]
    async fn process(&self, max_articles: usize, job: &JobTracker) -> Result<StageOutput, PipelineError> {
        job.advance(5, "Finding scraped data...");
        let Some(source_path) = self.store.latest_scraped().await? else {
            return Err(PipelineError::MissingPrerequisite(NO_SCRAPED_DATA.to_string()));
        };
        let Some(llm) = self.llm.as_ref() else {
            return Err(PipelineError::MissingPrerequisite(NO_API_KEY.to_string()));
        };

        job.advance(10, format!("Loading data from {}...", display_name(&source_path)));
        let scraped = self.store.load_scraped(&source_path).await?;
        let articles = scraped.articles();

        job.advance(30, format!("Processing {} articles with Gemini...", articles.len()));
        let processed = self.summarize_all(llm, &articles, max_articles, job).await;

        job.advance(80, "Generating dashboard summary...");
        let metrics = DashboardMetrics::from_articles(&processed);
        let narrative = Aggregator::new(llm).narrative(&metrics).await;

        job.advance(90, "Saving processed data...");
        let dataset = ProcessedDataset {
            processed_at: Local::now(),
            total_articles: articles.len(),
            processed_articles: processed.len(),
            dashboard_summary: Some(narrative),
            articles: processed,
        };
        let out = self.store.write_processed(&dataset).await?;

        Ok(StageOutput {
            message: format!("Processing complete! Generated {}", display_name(&out)),
            files: vec![out.display().to_string()],
        })
    }
}
