//! Markup encoding of a scraped dataset.
//!
//! ```text
//! <health_safety_news scraped_at="2025-07-05T17:28:10+01:00" total_articles="2">
//!   <article id="1">
//!     <title>..</title>
//!     <url>..</url>
//!     <source>hse-press</source>
//!     <scraped_at>..</scraped_at>
//!     <content>..</content>      <!-- only when a body was fetched -->
//!   </article>
//! </health_safety_news>
//! ```
//!
//! Articles are numbered from 1 in link order.

use crate::error::PipelineError;
use crate::models::{Link, ScrapedDataset};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "health_safety_news")]
struct XmlDataset {
    #[serde(rename = "@scraped_at")]
    scraped_at: DateTime<Local>,
    #[serde(rename = "@total_articles")]
    total_articles: usize,
    #[serde(rename = "article", default)]
    articles: Vec<XmlArticle>,
}

#[derive(Debug, Serialize, Deserialize)]
struct XmlArticle {
    #[serde(rename = "@id")]
    id: usize,
    title: String,
    url: String,
    source: String,
    scraped_at: DateTime<Local>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

pub fn to_xml(dataset: &ScrapedDataset) -> Result<String, PipelineError> {
    let doc = XmlDataset {
        scraped_at: dataset.scraped_at,
        total_articles: dataset.links.len(),
        articles: dataset
            .links
            .iter()
            .enumerate()
            .map(|(i, link)| XmlArticle {
                id: i + 1,
                title: link.title.clone(),
                url: link.url.clone(),
                source: link.source.clone(),
                scraped_at: link.scraped_at,
                content: dataset.content.get(&link.url).cloned(),
            })
            .collect(),
    };
    let body = quick_xml::se::to_string(&doc)?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}"))
}

pub fn from_xml(xml: &str) -> Result<ScrapedDataset, PipelineError> {
    let mut doc: XmlDataset = quick_xml::de::from_str(xml)?;
    doc.articles.sort_by_key(|a| a.id);

    let mut content = BTreeMap::new();
    let links = doc
        .articles
        .into_iter()
        .map(|a| {
            if let Some(body) = a.content.filter(|c| !c.trim().is_empty()) {
                content.insert(a.url.clone(), body);
            }
            Link {
                title: a.title,
                url: a.url,
                source: a.source,
                scraped_at: a.scraped_at,
            }
        })
        .collect();

    Ok(ScrapedDataset {
        scraped_at: doc.scraped_at,
        links,
        content,
    })
}
