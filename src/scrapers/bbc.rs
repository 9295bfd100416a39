//! BBC News health & safety topic page.
//!
//! The BBC front-end markup changes often, so several card layouts are
//! tried in order and their results merged.

use super::{SiteExtractor, collect_links, selectors};
use crate::models::Link;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use scraper::Selector;
use tracing::debug;
use url::Url;

static CARDS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "div.liverpool-card div.anchor-inner-wrapper a",
        "div[data-testid=\"liverpool-card\"] a",
        "article a",
        ".media__link",
    ])
});

pub struct BbcNews;

impl SiteExtractor for BbcNews {
    fn source_id(&self) -> &'static str {
        "bbc"
    }

    fn extract_at(&self, html: &str, base_url: &Url, scraped_at: DateTime<Local>) -> Vec<Link> {
        let links = collect_links(html, base_url, &CARDS, self.source_id(), scraped_at, |_, _| true);
        debug!(count = links.len(), "BBC links");
        links
    }
}
