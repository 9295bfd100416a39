//! Durable storage of scraped and processed datasets.
//!
//! # Submodules
//!
//! - [`xml`]: markup encoding of a scraped dataset
//! - [`json`]: flat-object encodings of both datasets
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── health_safety_news_20250705_172810.xml
//! ├── health_safety_news_20250705_172810.json
//! └── processed_articles_20250705_173502.json
//! ```
//!
//! Every artifact name embeds its run timestamp; nothing is ever
//! overwritten in place. Readers pick the most recent file by creation
//! time (modification time where the filesystem has none), ties broken by
//! name.

pub mod json;
pub mod xml;

use crate::error::PipelineError;
use crate::models::{ProcessedDataset, ScrapedDataset};
use crate::utils::run_stamp;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, info, instrument};

const SCRAPED_PREFIX: &str = "health_safety_news_";
const PROCESSED_PREFIX: &str = "processed_articles_";

/// Directory holding every dataset file.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write both encodings of `dataset`. Returns the written paths, markup first.
    #[instrument(level = "info", skip_all, fields(root = %self.root.display()))]
    pub async fn write_scraped(&self, dataset: &ScrapedDataset) -> Result<Vec<PathBuf>, PipelineError> {
        fs::create_dir_all(&self.root).await?;
        let stem = format!("{SCRAPED_PREFIX}{}", run_stamp(dataset.scraped_at));

        let xml_path = self.root.join(format!("{stem}.xml"));
        fs::write(&xml_path, xml::to_xml(dataset)?).await?;
        info!(path = %xml_path.display(), "Wrote scraped dataset (XML)");

        let json_path = self.root.join(format!("{stem}.json"));
        fs::write(&json_path, json::scraped_to_json(dataset)?).await?;
        info!(path = %json_path.display(), "Wrote scraped dataset (JSON)");

        Ok(vec![xml_path, json_path])
    }

    /// Most recent scraped dataset in markup form, if any.
    pub async fn latest_scraped(&self) -> Result<Option<PathBuf>, PipelineError> {
        self.latest(SCRAPED_PREFIX, "xml").await
    }

    /// Load a scraped dataset written in either encoding.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load_scraped(&self, path: &Path) -> Result<ScrapedDataset, PipelineError> {
        let text = fs::read_to_string(path).await?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("xml") => xml::from_xml(&text),
            Some("json") => json::scraped_from_json(&text),
            other => Err(PipelineError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    #[instrument(level = "info", skip_all, fields(root = %self.root.display()))]
    pub async fn write_processed(&self, dataset: &ProcessedDataset) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&self.root).await?;
        let path = self
            .root
            .join(format!("{PROCESSED_PREFIX}{}.json", run_stamp(dataset.processed_at)));
        fs::write(&path, json::processed_to_json(dataset)?).await?;
        info!(path = %path.display(), articles = dataset.articles.len(), "Wrote processed dataset");
        Ok(path)
    }

    pub async fn load_processed(&self, path: &Path) -> Result<ProcessedDataset, PipelineError> {
        json::processed_from_json(&fs::read_to_string(path).await?)
    }

    /// Most recent processed dataset. `None` means "no data yet".
    pub async fn latest_processed(&self) -> Result<Option<ProcessedDataset>, PipelineError> {
        match self.latest(PROCESSED_PREFIX, "json").await? {
            Some(path) => Ok(Some(self.load_processed(&path).await?)),
            None => Ok(None),
        }
    }

    async fn latest(&self, prefix: &str, extension: &str) -> Result<Option<PathBuf>, PipelineError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(SystemTime, String, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix) || !name.ends_with(&format!(".{extension}")) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let stamp = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let candidate = (stamp, name, entry.path());
            if newest
                .as_ref()
                .is_none_or(|best| (&candidate.0, &candidate.1) > (&best.0, &best.1))
            {
                newest = Some(candidate);
            }
        }

        if let Some((_, name, _)) = &newest {
            debug!(file = %name, "Latest dataset file");
        }
        Ok(newest.map(|(_, _, path)| path))
    }
}
