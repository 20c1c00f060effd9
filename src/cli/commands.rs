use anyhow::{Context, Result};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::SpyfuClient;
use crate::cli::config::{default_document_path, ConfigDocument, ConfigOverrides, ConfigProvider, SweepSettings};
use crate::cli::Completion;
use crate::storage::{self, SinkFactory};
use crate::sweep::pacing;
use crate::sweep::{FetchOrchestrator, SweepSpace};

fn resolve(overrides: ConfigOverrides) -> Result<SweepSettings> {
    ConfigProvider::from_process_env(overrides)
        .resolve()
        .context("Invalid configuration")
}

/// Run a sweep and save whatever was fetched
pub async fn run(overrides: ConfigOverrides) -> Result<Completion> {
    let settings = resolve(overrides)?;

    let client = Arc::new(SpyfuClient::new(&settings.fetch)?);
    let pacer = pacing::from_settings(&settings.pacing);

    // Ctrl-C stops scheduling; in-flight cells finish and the partial result is still written
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight cells");
            interrupt.cancel();
        }
    });

    let orchestrator = FetchOrchestrator::new(client, pacer, settings.fetch.clone())
        .with_cancellation(cancel);

    let mut report = orchestrator
        .run(settings.sweep.clone(), settings.fetch.concurrency)
        .await?;
    report.log_summary();

    let records = storage::dedupe(std::mem::take(&mut report.records), settings.output.dedupe);
    let path = storage::output_path(&settings.output, Local::now());
    let sink = SinkFactory::create(settings.output.format, path);
    let location = sink.write(&records).await?;

    info!("Saved {} records to {}", records.len(), location.display());

    if report.is_complete() {
        Ok(Completion::Full)
    } else {
        Ok(Completion::Partial)
    }
}

/// Print the cells a run would fetch
pub fn plan(overrides: ConfigOverrides) -> Result<()> {
    let settings = resolve(overrides)?;
    let space = SweepSpace::new(settings.sweep.clone())?;
    let band = space.volume_band();

    println!(
        "{} queries x difficulties {}..={} = {} cells",
        space.config().queries.len(),
        space.config().difficulty_start,
        space.config().difficulty_end,
        space.len()
    );
    match band.max {
        Some(max) => println!("Search volume: {}..={}", band.min, max),
        None => println!("Search volume: >= {}", band.min),
    }
    println!(
        "Up to {} requests per cell, {} cells at a time",
        settings.fetch.max_pages, settings.fetch.concurrency
    );

    for query in &space.config().queries {
        println!("  - {}", query);
    }

    Ok(())
}

/// Show the resolved configuration
pub fn show_config(overrides: ConfigOverrides) -> Result<()> {
    let settings = resolve(overrides)?;

    match &settings.source {
        Some(path) => println!("Configuration file: {}", path.display()),
        None => println!("Configuration file: none"),
    }
    println!(
        "{}",
        serde_yaml::to_string(&settings).context("Failed to serialize configuration")?
    );

    Ok(())
}

/// Write a starter configuration document
pub fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(default_document_path);

    if path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    ConfigDocument::starter().save_to_file(&path)?;
    println!("Created configuration file: {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let path = std::env::temp_dir().join(format!("keyword-sweep-{}.yaml", uuid::Uuid::new_v4()));

        init_config(Some(path.clone()), false).unwrap();
        assert!(init_config(Some(path.clone()), false).is_err());
        init_config(Some(path.clone()), true).unwrap();

        let document = ConfigDocument::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(document.ranking_difficulty_end, Some(100));
    }
}
