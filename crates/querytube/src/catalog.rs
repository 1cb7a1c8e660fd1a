//! Loads the scraped video catalog from CSV.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::types::VideoRecord;

/// Raw CSV row. Extra columns in the file are ignored.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    video_id: String,
    title: String,
    description: String,
    #[serde(default)]
    published_date: Option<String>,
}

/// Ordered, ID-unique list of videos. File order is preserved and used as the
/// tie-break order when ranking.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<VideoRecord>,
}

impl Catalog {
    pub fn from_records(records: Vec<VideoRecord>) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let records = records
            .into_iter()
            .filter(|r| {
                if r.video_id.is_empty() {
                    tracing::warn!(title = %r.title, "Skipping catalog row without video_id");
                    return false;
                }
                if !seen.insert(r.video_id.clone()) {
                    tracing::warn!(video_id = %r.video_id, "Skipping duplicate catalog row");
                    return false;
                }
                true
            })
            .collect();
        Self { records }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open catalog: {}", path.display()))?;
        let catalog = Self::from_reader(file)
            .with_context(|| format!("Failed to parse catalog: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            videos = catalog.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        for (line, row) in csv_reader.deserialize::<CatalogRow>().enumerate() {
            let row = row.with_context(|| format!("Invalid catalog row {}", line + 1))?;
            let published_date = row.published_date.as_deref().and_then(parse_date);
            records.push(VideoRecord {
                video_id: row.video_id,
                title: row.title,
                description: row.description,
                published_date,
            });
        }

        Ok(Self::from_records(records))
    }

    pub fn records(&self) -> &[VideoRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<VideoRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and `YYYY-MM-DD HH:MM:SS` prefixes.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}
