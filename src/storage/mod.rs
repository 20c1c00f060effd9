pub mod csv_sink;
pub mod json_sink;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::collections::HashSet;
use tokio::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::cli::config::{DedupeMode, OutputFormat, OutputSettings};
use crate::sweep::KeywordRecord;

// Re-export common types
pub use csv_sink::CsvSink;
pub use json_sink::JsonSink;

/// Destination for the aggregated records of a run
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist the records and return where they went
    async fn write(&self, records: &[KeywordRecord]) -> Result<PathBuf>;
}

/// Factory for creating a ResultSink implementation
pub struct SinkFactory;

impl SinkFactory {
    /// Create the sink for the configured format, writing to `path`
    pub fn create(format: OutputFormat, path: PathBuf) -> Arc<dyn ResultSink> {
        match format {
            OutputFormat::Csv => Arc::new(CsvSink::new(path)),
            OutputFormat::Json => Arc::new(JsonSink::new(path)),
        }
    }
}

/// Final output path: the explicit path if one was given, otherwise
/// `<directory>/<name>[_<YYYYmmdd_HHMMSS>].<ext>`
pub fn output_path(settings: &OutputSettings, now: DateTime<Local>) -> PathBuf {
    if let Some(path) = &settings.path {
        return path.clone();
    }

    let stem = if settings.timestamp {
        format!("{}_{}", settings.name, now.format("%Y%m%d_%H%M%S"))
    } else {
        settings.name.clone()
    };

    settings
        .directory
        .join(format!("{}.{}", stem, settings.format.extension()))
}

/// Apply the configured duplicate handling
pub fn dedupe(records: Vec<KeywordRecord>, mode: DedupeMode) -> Vec<KeywordRecord> {
    match mode {
        DedupeMode::None => records,
        DedupeMode::PerQuery => {
            let before = records.len();
            let mut seen = HashSet::new();
            let kept: Vec<KeywordRecord> = records
                .into_iter()
                .filter(|r| seen.insert((r.query.clone(), r.keyword.to_lowercase())))
                .collect();
            debug!("Dropped {} duplicate records", before - kept.len());
            kept
        }
    }
}

/// Create the parent directory of an output file if needed
async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}
