//! HSE Network news category.
//!
//! A WordPress site whose listing pages mix article links with tag clouds
//! and short navigation anchors; a minimum title length filters those out.

use super::{SiteExtractor, collect_links, selectors, wordpress_page_url};
use crate::models::Link;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::debug;
use url::Url;

const MIN_TITLE_CHARS: usize = 10;

static ARTICLE_LINKS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "article a[href]",
        ".post-title a[href]",
        "h2 a[href]",
        "h3 a[href]",
    ])
});

pub struct HseNetwork;

impl SiteExtractor for HseNetwork {
    fn source_id(&self) -> &'static str {
        "hse-network"
    }

    fn extract_at(&self, html: &str, base_url: &Url, scraped_at: DateTime<Local>) -> Vec<Link> {
        let links = collect_links(html, base_url, &ARTICLE_LINKS, self.source_id(), scraped_at, |title, url| {
            title.chars().count() > MIN_TITLE_CHARS && url.contains("hse-network.com")
        });
        debug!(count = links.len(), "HSE Network links");
        links
    }

    fn page_url(&self, base_url: &str, page: u32) -> Option<String> {
        Some(wordpress_page_url(base_url, page))
    }
}
