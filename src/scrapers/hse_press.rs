//! HSE press releases.

use super::{SiteExtractor, collect_links, selectors, wordpress_page_url};
use crate::models::Link;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::debug;
use url::Url;

static RELEASES: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "h2 a[href]",
        ".entry-title a[href]",
        "article h2 a[href]",
        "h3 a[href]",
    ])
});

pub struct HsePress;

impl SiteExtractor for HsePress {
    fn source_id(&self) -> &'static str {
        "hse-press"
    }

    fn extract_at(&self, html: &str, base_url: &Url, scraped_at: DateTime<Local>) -> Vec<Link> {
        let links = collect_links(html, base_url, &RELEASES, self.source_id(), scraped_at, |_, url| {
            url.contains("press.hse.gov.uk")
        });
        debug!(count = links.len(), "HSE Press links");
        links
    }

    fn page_url(&self, base_url: &str, page: u32) -> Option<String> {
        Some(wordpress_page_url(base_url, page))
    }
}
