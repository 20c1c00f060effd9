use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::storage::{ensure_parent, ResultSink};
use crate::sweep::KeywordRecord;

/// Writes records as a pretty-printed JSON array
pub struct JsonSink {
    path: PathBuf,
}

impl JsonSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ResultSink for JsonSink {
    async fn write(&self, records: &[KeywordRecord]) -> Result<PathBuf> {
        ensure_parent(&self.path).await?;

        let contents = serde_json::to_string_pretty(records)
            .context("Failed to serialize records")?;

        fs::write(&self.path, contents)
            .await
            .context(format!("Failed to write output file: {}", self.path.display()))?;

        debug!("Exported {} records to JSON file: {}", records.len(), self.path.display());

        Ok(self.path.clone())
    }
}
