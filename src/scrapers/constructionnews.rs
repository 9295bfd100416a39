//! Construction News health & safety section.
//!
//! Headlines are `h2` elements wrapping a single anchor. The section page
//! also links out to unrelated verticals, so only URLs under
//! `/health-and-safety/` are kept.

use super::{SiteExtractor, collect_links, selectors};
use crate::models::Link;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::debug;
use url::Url;

static HEADLINES: Lazy<Vec<Selector>> = Lazy::new(|| selectors(&["h2 a[href]"]));

pub struct ConstructionNews;

impl SiteExtractor for ConstructionNews {
    fn source_id(&self) -> &'static str {
        "constructionnews"
    }

    fn extract_at(&self, html: &str, base_url: &Url, scraped_at: DateTime<Local>) -> Vec<Link> {
        let links = collect_links(html, base_url, &HEADLINES, self.source_id(), scraped_at, |_, url| {
            url.contains("/health-and-safety/")
        });
        debug!(count = links.len(), "Construction News links");
        links
    }
}
