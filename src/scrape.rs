//! Scrape run orchestration across every configured source.
//!
//! For each [`Source`] the scraper fetches the main listing page, follows
//! any extra listing pages, then (optionally) fetches the bodies of the
//! first few links. Work is strictly sequential with pauses between
//! requests so third-party sites see a gentle, steady load.
//!
//! A source that cannot be scraped is logged and skipped; the run always
//! completes with whatever the other sources produced.

use crate::config::ScrapeConfig;
use crate::error::ScrapeError;
use crate::fetch::{Fetcher, PageFetch};
use crate::models::{Link, ScrapedDataset};
use crate::scrapers::Source;
use crate::scrapers::content::ContentExtractor;
use crate::utils::truncate_for_log;
use chrono::Local;
use itertools::Itertools;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use url::Url;

/// Pacing and volume knobs for a scrape run.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub fetch_content: bool,
    pub max_articles_per_site: usize,
    pub page_delay: Duration,
    pub article_delay: Duration,
    pub site_delay: Duration,
}

impl From<&ScrapeConfig> for ScrapeSettings {
    fn from(config: &ScrapeConfig) -> Self {
        Self {
            fetch_content: config.fetch_content,
            max_articles_per_site: config.max_articles_per_site,
            page_delay: config.page_delay(),
            article_delay: config.article_delay(),
            site_delay: config.site_delay(),
        }
    }
}

pub struct Scraper<T> {
    fetcher: Fetcher<T>,
    sources: Vec<&'static Source>,
    settings: ScrapeSettings,
}

impl<T: PageFetch> Scraper<T> {
    pub fn new(fetcher: Fetcher<T>, sources: Vec<&'static Source>, settings: ScrapeSettings) -> Self {
        Self {
            fetcher,
            sources,
            settings,
        }
    }

    pub fn sources(&self) -> &[&'static Source] {
        &self.sources
    }

    /// Scrape every source and assemble the run's dataset.
    ///
    /// `on_source_done` is called with the number of sources finished so far,
    /// so callers can report progress.
    #[instrument(level = "info", skip_all, fields(sources = self.sources.len()))]
    pub async fn scrape_all<F>(&self, mut on_source_done: F) -> ScrapedDataset
    where
        F: FnMut(usize) + Send,
    {
        let scraped_at = Local::now();
        let mut links: Vec<Link> = Vec::new();
        let mut content: BTreeMap<String, String> = BTreeMap::new();

        for (i, source) in self.sources.iter().enumerate() {
            match self.scrape_site(source).await {
                Ok(site_links) => {
                    if self.settings.fetch_content {
                        content.extend(self.fetch_contents(source, &site_links).await);
                    }
                    links.extend(site_links);
                }
                Err(e) => {
                    error!(source = source.name, error = %e, "Error scraping source; skipping");
                }
            }
            on_source_done(i + 1);
            if i + 1 < self.sources.len() {
                sleep(self.settings.site_delay).await;
            }
        }

        let links: Vec<Link> = links.into_iter().unique_by(|l| l.url.clone()).collect();
        info!(
            links = links.len(),
            with_content = content.len(),
            "Scrape run complete"
        );
        ScrapedDataset {
            scraped_at,
            links,
            content,
        }
    }

    /// Main page plus any extra listing pages of one source.
    #[instrument(level = "info", skip_all, fields(source = source.name))]
    pub async fn scrape_site(&self, source: &Source) -> Result<Vec<Link>, ScrapeError> {
        let base = Url::parse(source.url).map_err(|e| ScrapeError::InvalidUrl {
            url: source.url.to_string(),
            source: e,
        })?;
        let html = self
            .fetcher
            .fetch(source.url)
            .await
            .ok_or_else(|| ScrapeError::Unavailable(source.url.to_string()))?;

        let mut links = source.extractor.extract(&html, &base);
        info!(count = links.len(), "Found links on main page");

        // Page 1 is the main page fetched above.
        for &page in source.pages.iter().filter(|&&p| p != 1) {
            let Some(page_url) = source.extractor.page_url(source.url, page) else {
                continue;
            };
            info!(page, url = %page_url, "Scraping listing page");
            match (self.fetcher.fetch(&page_url).await, Url::parse(&page_url)) {
                (Some(html), Ok(page_base)) => {
                    let page_links = source.extractor.extract(&html, &page_base);
                    info!(page, count = page_links.len(), "Found links on listing page");
                    links.extend(page_links);
                }
                (None, _) => warn!(page, "Listing page unavailable"),
                (_, Err(e)) => warn!(page, error = %e, "Listing page url invalid"),
            }
            sleep(self.settings.page_delay).await;
        }

        Ok(links.into_iter().unique_by(|l| l.url.clone()).collect())
    }

    /// Bodies for the first `max_articles_per_site` links, keyed by URL.
    async fn fetch_contents(&self, source: &Source, links: &[Link]) -> Vec<(String, String)> {
        let extractor = ContentExtractor::new(&self.fetcher);
        let limited = &links[..links.len().min(self.settings.max_articles_per_site)];
        let mut fetched = Vec::with_capacity(limited.len());

        for (i, link) in limited.iter().enumerate() {
            info!(
                n = i + 1,
                total = limited.len(),
                title = %truncate_for_log(&link.title, 50),
                "Fetching article content"
            );
            if let Some(body) = extractor.extract(&link.url).await.filter(|b| !b.is_empty()) {
                fetched.push((link.url.clone(), body));
            }
            sleep(self.settings.article_delay).await;
        }

        info!(count = fetched.len(), source = source.name, "Fetched article contents");
        fetched
    }
}
