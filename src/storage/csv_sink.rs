use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use crate::storage::{ensure_parent, ResultSink};
use crate::sweep::KeywordRecord;

const HEADER: [&str; 5] = ["query", "keyword", "searchVolume", "rankingDifficulty", "cpc"];

/// Writes records as comma-separated rows with a header line
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ResultSink for CsvSink {
    async fn write(&self, records: &[KeywordRecord]) -> Result<PathBuf> {
        ensure_parent(&self.path).await?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        // Written explicitly so an empty run still gets a header
        writer
            .write_record(HEADER)
            .context("Failed to write CSV header")?;

        for record in records {
            writer
                .serialize(record)
                .context("Failed to write CSV row")?;
        }

        let contents = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e.error()))?;

        fs::write(&self.path, contents)
            .await
            .context(format!("Failed to write output file: {}", self.path.display()))?;

        debug!("Exported {} records to CSV file: {}", records.len(), self.path.display());

        Ok(self.path.clone())
    }
}
