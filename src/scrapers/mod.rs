//! News source extractors and the static source registry.
//!
//! Each source has its own [`SiteExtractor`] implementation that knows the
//! structural rules of its listing pages. Adding a source means adding a
//! module and a [`Source`] row to [`SOURCES`]; nothing else branches on
//! which site is being scraped.
//!
//! # Supported Sources
//!
//! | Source | Module | Pages | Notes |
//! |--------|--------|-------|-------|
//! | Construction News | [`constructionnews`] | 1 | Health & safety section only |
//! | BBC News | [`bbc`] | 1 | Health & safety topic page |
//! | HSE Network | [`hse_network`] | 1–5 | `page/N/` pagination |
//! | HSE Press | [`hse_press`] | 1–2 | Regulator press releases |
//!
//! Article bodies are pulled out by the shared [`content`] extractor.

pub mod bbc;
pub mod constructionnews;
pub mod content;
pub mod hse_network;
pub mod hse_press;

use crate::models::Link;
use crate::utils::normalize_whitespace;
use chrono::{DateTime, Local};
use itertools::Itertools;
use scraper::{Html, Selector};
use url::Url;

/// Extracts candidate article links from a fetched listing page.
pub trait SiteExtractor: Sync {
    /// Identifier stamped into every [`Link::source`].
    fn source_id(&self) -> &'static str;

    /// Source-specific link rules, stamping every link with `scraped_at`.
    fn extract_at(&self, html: &str, base_url: &Url, scraped_at: DateTime<Local>) -> Vec<Link>;

    /// Extract links, all sharing one extraction timestamp.
    fn extract(&self, html: &str, base_url: &Url) -> Vec<Link> {
        self.extract_at(html, base_url, Local::now())
    }

    /// URL of listing page `page` (1-based), for paginated sources.
    fn page_url(&self, _base_url: &str, _page: u32) -> Option<String> {
        None
    }
}

/// A registered news source.
pub struct Source {
    pub name: &'static str,
    pub url: &'static str,
    pub extractor: &'static dyn SiteExtractor,
    /// Listing pages to visit. Empty means the main page only.
    pub pages: &'static [u32],
}

impl Source {
    pub fn id(&self) -> &'static str {
        self.extractor.source_id()
    }
}

pub static SOURCES: &[Source] = &[
    Source {
        name: "Construction News",
        url: "https://www.constructionnews.co.uk/health-and-safety/",
        extractor: &constructionnews::ConstructionNews,
        pages: &[],
    },
    Source {
        name: "BBC Health & Safety",
        url: "https://www.bbc.com/news/topics/cpzy90q2y90t",
        extractor: &bbc::BbcNews,
        pages: &[],
    },
    Source {
        name: "HSE Network",
        url: "https://www.hse-network.com/category/latest-health-and-safety-news/",
        extractor: &hse_network::HseNetwork,
        pages: &[1, 2, 3, 4, 5],
    },
    Source {
        name: "HSE Press",
        url: "https://press.hse.gov.uk/category/news/",
        extractor: &hse_press::HsePress,
        pages: &[1, 2],
    },
];

/// Registered sources filtered to `ids`; an empty filter selects all of them.
pub fn select_sources(ids: &[String]) -> Vec<&'static Source> {
    SOURCES
        .iter()
        .filter(|s| ids.is_empty() || ids.iter().any(|id| id == s.id()))
        .collect()
}

/// `{base}page/{n}/` pagination shared by the WordPress-style sources.
pub(crate) fn wordpress_page_url(base_url: &str, page: u32) -> String {
    format!("{}/page/{}/", base_url.trim_end_matches('/'), page)
}

/// Walk `selectors` in order over `html`, resolving each anchor against
/// `base_url` and keeping the first occurrence of every URL that `keep`
/// accepts. Anchors without text are never kept.
pub(crate) fn collect_links<F>(
    html: &str,
    base_url: &Url,
    selectors: &[Selector],
    source: &str,
    scraped_at: DateTime<Local>,
    keep: F,
) -> Vec<Link>
where
    F: Fn(&str, &str) -> bool,
{
    let document = Html::parse_document(html);
    selectors
        .iter()
        .flat_map(|selector| document.select(selector))
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let url = base_url.join(href).ok()?.to_string();
            let title = normalize_whitespace(&anchor.text().collect::<String>());
            (!title.is_empty() && keep(&title, &url)).then(|| Link {
                title,
                url,
                source: source.to_string(),
                scraped_at,
            })
        })
        .unique_by(|link| link.url.clone())
        .collect()
}

/// Compile a static selector list.
pub(crate) fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ids_are_unique() {
        let ids: Vec<&str> = SOURCES.iter().map(Source::id).collect();
        assert_eq!(ids.iter().unique().count(), ids.len());
    }

    #[test]
    fn test_select_sources_filters_by_id() {
        assert_eq!(select_sources(&[]).len(), SOURCES.len());
        let picked = select_sources(&["hse-press".to_string()]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "HSE Press");
        assert!(select_sources(&["nope".to_string()]).is_empty());
    }

    #[test]
    fn test_wordpress_page_url() {
        assert_eq!(
            wordpress_page_url("https://press.hse.gov.uk/category/news/", 2),
            "https://press.hse.gov.uk/category/news/page/2/"
        );
    }

    #[test]
    fn test_collect_links_dedupes_and_resolves() {
        let html = r#"<html><body>
            <h2><a href="/a">First</a></h2>
            <h3><a href="https://example.com/a">First again</a></h3>
            <h3><a href="/b">  </a></h3>
            <h3><a href="/c">Third</a></h3>
        </body></html>"#;
        let base = Url::parse("https://example.com/news/").unwrap();
        let now = Local::now();
        let links = collect_links(
            html,
            &base,
            &selectors(&["h2 a[href]", "h3 a[href]"]),
            "test",
            now,
            |_, _| true,
        );
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/c"]);
        assert_eq!(links[0].title, "First");
        assert!(links.iter().all(|l| l.scraped_at == now && l.source == "test"));
    }

    #[test]
    fn test_collect_links_title_spans_inline_tags() {
        let html = r#"<html><body>
            <h3><a href="/a">Scaffold<span>ing</span> <b>collapse</b>
                injures   two</a></h3>
        </body></html>"#;
        let base = Url::parse("https://example.com/").unwrap();
        let links = collect_links(html, &base, &selectors(&["h3 a[href]"]), "test", Local::now(), |_, _| true);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Scaffolding collapse injures two");
    }
}
