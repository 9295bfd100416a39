//! Readable body text extraction for article pages.
//!
//! Source listing pages differ, but article pages across these sites share a
//! handful of layouts. Rather than one parser per site, the extractor:
//!
//! 1. Ignores boilerplate subtrees (scripts, navigation, ads, sidebars, …)
//! 2. Tries an ordered list of content-region locators and takes the first
//!    region whose text is longer than [`MIN_CONTENT_CHARS`], which skips
//!    empty or stub containers
//! 3. Falls back to the whole `<body>` when no region qualifies
//!
//! The result is whitespace-normalized plain text.

use crate::fetch::{Fetcher, PageFetch};
use crate::utils::normalize_whitespace;
use once_cell::sync::Lazy;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};

/// Regions with less text than this are treated as empty containers.
pub const MIN_CONTENT_CHARS: usize = 100;

const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe",
];

const BOILERPLATE_CLASSES: &[&str] = &[
    "advertisement",
    "ads",
    "social-share",
    "navigation",
    "sidebar",
];

static CONTENT_REGIONS: Lazy<Vec<Selector>> = Lazy::new(|| {
    super::selectors(&[
        "article .content",
        "article .post-content",
        "article .entry-content",
        ".main-content article",
        ".content article",
        "article",
        ".post-content",
        ".entry-content",
        "#content",
        "main",
        ".main",
    ])
});

static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").expect("static selector"));

/// Fetches article pages and reduces them to readable text.
pub struct ContentExtractor<'a, T> {
    fetcher: &'a Fetcher<T>,
}

impl<'a, T: PageFetch> ContentExtractor<'a, T> {
    pub fn new(fetcher: &'a Fetcher<T>) -> Self {
        Self { fetcher }
    }

    /// Fetch `url` and extract its body text. `None` if the page is unavailable.
    #[instrument(level = "info", skip(self))]
    pub async fn extract(&self, url: &str) -> Option<String> {
        let Some(html) = self.fetcher.fetch(url).await else {
            warn!("Article page unavailable");
            return None;
        };
        let text = extract_readable_text(&html);
        info!(chars = text.chars().count(), "Extracted article text");
        Some(text)
    }
}

/// Reduce an HTML document to its main readable text.
pub fn extract_readable_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector in CONTENT_REGIONS.iter() {
        // Only the first live match of each locator is considered.
        let Some(region) = document.select(selector).find(|el| !in_boilerplate(el)) else {
            continue;
        };
        let text = visible_text(region);
        if text.chars().count() > MIN_CONTENT_CHARS {
            debug!(?selector, "Content region matched");
            return text;
        }
    }

    debug!("No content region qualified; falling back to <body>");
    document
        .select(&BODY)
        .next()
        .map(visible_text)
        .unwrap_or_else(|| visible_text(document.root_element()))
}

fn is_boilerplate(el: &ElementRef) -> bool {
    let element = el.value();
    BOILERPLATE_TAGS.contains(&element.name())
        || element
            .classes()
            .any(|class| BOILERPLATE_CLASSES.contains(&class))
}

fn in_boilerplate(el: &ElementRef) -> bool {
    is_boilerplate(el)
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_boilerplate(&ancestor))
}

/// Normalized text of `root`, skipping boilerplate descendants.
fn visible_text(root: ElementRef) -> String {
    let mut raw = String::new();
    push_text(root, &mut raw);
    normalize_whitespace(&raw)
}

fn push_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    if !is_boilerplate(&child_el) {
                        push_text(child_el, out);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticPages;

    fn long_text(words: usize) -> String {
        vec!["inspectors"; words].join(" ")
    }

    #[test]
    fn test_prefers_article_content_and_strips_boilerplate() {
        let html = format!(
            r#"<html><body>
                <header>Site header</header>
                <nav>Home | News</nav>
                <article>
                  <div class="content">
                    <p>{}</p>
                    <script>var tracking = 1;</script>
                    <div class="ads">Buy now</div>
                    <p>Final paragraph.</p>
                  </div>
                </article>
                <footer>Copyright</footer>
            </body></html>"#,
            long_text(20)
        );
        let text = extract_readable_text(&html);
        assert!(text.starts_with("inspectors inspectors"));
        assert!(text.ends_with("Final paragraph."));
        assert!(!text.contains("tracking"));
        assert!(!text.contains("Buy now"));
        assert!(!text.contains("Site header"));
    }

    #[test]
    fn test_skips_short_regions() {
        let html = format!(
            r#"<html><body>
                <article><div class="content">Too short</div></article>
                <div id="content"><p>{}</p></div>
            </body></html>"#,
            long_text(15)
        );
        let text = extract_readable_text(&html);
        // `article` itself is also short, so `#content` wins.
        assert_eq!(text, long_text(15));
    }

    #[test]
    fn test_region_inside_sidebar_is_ignored() {
        let html = format!(
            r#"<html><body>
                <aside><article>{}</article></aside>
                <main><p>{}</p></main>
            </body></html>"#,
            long_text(30),
            long_text(12)
        );
        assert_eq!(extract_readable_text(&html), long_text(12));
    }

    #[test]
    fn test_falls_back_to_body() {
        let html = r#"<html><body><nav>Menu</nav><p>Short   notice
            only.</p></body></html>"#;
        assert_eq!(extract_readable_text(html), "Short notice only.");
    }

    #[tokio::test]
    async fn test_unavailable_page_yields_none() {
        let fetcher = Fetcher::new(StaticPages::new(), 1);
        let extractor = ContentExtractor::new(&fetcher);
        assert_eq!(extractor.extract("https://example.com/gone").await, None);
    }
}
