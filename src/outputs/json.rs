//! Flat-object (JSON) encodings of the scraped and processed datasets.

use crate::error::PipelineError;
use crate::models::{Link, ProcessedDataset, ScrapedDataset};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// On-disk shape of a scraped dataset: bodies keyed by URL.
#[derive(Debug, Serialize, Deserialize)]
struct ScrapedJson {
    scraped_at: DateTime<Local>,
    total_links: usize,
    total_articles_with_content: usize,
    links: Vec<Link>,
    #[serde(default)]
    articles_content: BTreeMap<String, String>,
}

pub fn scraped_to_json(dataset: &ScrapedDataset) -> Result<String, PipelineError> {
    let doc = ScrapedJson {
        scraped_at: dataset.scraped_at,
        total_links: dataset.links.len(),
        total_articles_with_content: dataset.content.len(),
        links: dataset.links.clone(),
        articles_content: dataset.content.clone(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

pub fn scraped_from_json(json: &str) -> Result<ScrapedDataset, PipelineError> {
    let doc: ScrapedJson = serde_json::from_str(json)?;
    Ok(ScrapedDataset {
        scraped_at: doc.scraped_at,
        links: doc.links,
        content: doc.articles_content,
    })
}

pub fn processed_to_json(dataset: &ProcessedDataset) -> Result<String, PipelineError> {
    Ok(serde_json::to_string_pretty(dataset)?)
}

pub fn processed_from_json(json: &str) -> Result<ProcessedDataset, PipelineError> {
    Ok(serde_json::from_str(json)?)
}
