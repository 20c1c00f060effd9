use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::sweep::{SweepConfig, VolumeBand};

pub const DEFAULT_ENDPOINT: &str = "https://www.spyfu.com/NsaApi/RelatedKeyword/GetPhraseMatchedKeywords";

/// Errors that make a run impossible before any request is sent
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no queries provided")]
    EmptyQueries,

    #[error("ranking difficulty range is inverted: start {start} > end {end}")]
    InvertedDifficulty { start: i64, end: i64 },

    #[error("search volume band is inverted: min {min} > max {max}")]
    InvertedVolume { min: u64, max: u64 },

    #[error("{name} must be a number, got {value:?}")]
    InvalidNumber { name: String, value: String },

    #[error("{0}")]
    InvalidSetting(String),

    #[error("configuration file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("failed to read configuration file {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: std::io::Error },

    #[error("failed to parse configuration file {}: {message}", path.display())]
    Unparsable { path: PathBuf, message: String },
}

/// Runtime parameters that take precedence over the environment and the config file
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// Configuration file (JSON or YAML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seed query to sweep (repeatable)
    #[arg(short, long = "query")]
    pub queries: Vec<String>,

    /// First ranking difficulty of the sweep
    #[arg(long)]
    pub difficulty_start: Option<i64>,

    /// Last ranking difficulty of the sweep (inclusive)
    #[arg(long)]
    pub difficulty_end: Option<i64>,

    /// Minimum monthly search volume
    #[arg(long)]
    pub volume_min: Option<u64>,

    /// Maximum monthly search volume (unbounded when omitted)
    #[arg(long)]
    pub volume_max: Option<u64>,

    /// Base name of the output file
    #[arg(long)]
    pub output_name: Option<String>,

    /// Exact output file path, bypassing name and timestamp rules
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Number of cells fetched concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Maximum pages requested per cell
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Do not append a timestamp to the output file name
    #[arg(long)]
    pub no_timestamp: bool,
}

/// Output file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

/// Duplicate handling applied just before the results are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupeMode {
    /// Keep every record
    None,
    /// Keep the first record for each (query, keyword) pair
    PerQuery,
}

/// Upstream request settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchSettings {
    pub endpoint: String,
    pub country_code: String,
    pub adult_filter: bool,
    pub page_size: u32,
    pub max_pages: u32,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

/// Courtesy delay applied before every page request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PacingSettings {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Where and how the aggregated results are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputSettings {
    pub name: String,
    pub directory: PathBuf,
    pub format: OutputFormat,
    pub timestamp: bool,
    pub dedupe: DedupeMode,
    /// Exact file path; only ever set from the command line
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            country_code: "US".to_string(),
            adult_filter: true,
            page_size: 50,
            max_pages: 20,
            concurrency: 10,
            max_retries: 2,
            retry_backoff_ms: 500,
            request_timeout_secs: 30,
            user_agent: format!("keyword-sweep/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 250,
            max_delay_ms: 750,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            name: "keywords_results".to_string(),
            directory: PathBuf::from("."),
            format: OutputFormat::Csv,
            timestamp: true,
            dedupe: DedupeMode::None,
            path: None,
        }
    }
}

/// Persisted configuration document. Every sweep field is optional so that
/// higher-precedence sources can fill the gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_difficulty_start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_difficulty_end: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_volume_min: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_volume_max: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    pub fetch: FetchSettings,
    pub pacing: PacingSettings,
    pub output: OutputSettings,
}

impl ConfigDocument {
    /// The document written by `config init`
    pub fn starter() -> Self {
        Self {
            queries: Some(vec!["seo tools".to_string()]),
            ranking_difficulty_start: Some(DEFAULT_DIFFICULTY_START),
            ranking_difficulty_end: Some(DEFAULT_DIFFICULTY_END),
            search_volume_min: Some(DEFAULT_VOLUME_MIN),
            search_volume_max: None,
            output_name: None,
            ..Default::default()
        }
    }

    /// Load a document, choosing the parser from the file extension
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed = if is_json(path) {
            serde_json::from_str(&contents).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&contents).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| ConfigError::Unparsable {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Save the document, choosing the format from the file extension
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = if is_json(path) {
            serde_json::to_string_pretty(self).context("Failed to serialize configuration")?
        } else {
            serde_yaml::to_string(self).context("Failed to serialize configuration")?
        };

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "json")
}

const DEFAULT_DIFFICULTY_START: i64 = 1;
const DEFAULT_DIFFICULTY_END: i64 = 100;
const DEFAULT_VOLUME_MIN: u64 = 500;

/// Fully resolved settings for one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSettings {
    pub sweep: SweepConfig,
    pub fetch: FetchSettings,
    pub pacing: PacingSettings,
    pub output: OutputSettings,
    /// Document the file-level values came from, if any
    pub source: Option<PathBuf>,
}

/// Resolves settings with a fixed per-field precedence:
/// command line, then environment, then config document, then defaults.
pub struct ConfigProvider {
    overrides: ConfigOverrides,
    env: HashMap<String, String>,
    search_paths: Vec<PathBuf>,
}

impl ConfigProvider {
    /// Provider reading the current process environment and the standard document locations
    pub fn from_process_env(overrides: ConfigOverrides) -> Self {
        Self::new(overrides, std::env::vars().collect(), Self::default_search_paths())
    }

    pub fn new(
        overrides: ConfigOverrides,
        env: HashMap<String, String>,
        search_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            overrides,
            env,
            search_paths,
        }
    }

    /// Documents tried, in order, when `--config` is not given
    pub fn default_search_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("config.json"),
            PathBuf::from("config.yaml"),
            default_document_path(),
        ]
    }

    pub fn resolve(&self) -> Result<SweepSettings, ConfigError> {
        let (source, document) = match self.load_document()? {
            Some((path, document)) => (Some(path), document),
            None => (None, ConfigDocument::default()),
        };

        let queries = if !self.overrides.queries.is_empty() {
            self.overrides.queries.clone()
        } else if let Some(raw) = self.env_value("QUERIES") {
            raw.split(',').map(str::to_string).collect()
        } else {
            document.queries.clone().unwrap_or_default()
        };

        let difficulty_start = self
            .overrides
            .difficulty_start
            .or(self.env_number("RANKING_DIFFICULTY_START")?)
            .or(document.ranking_difficulty_start)
            .unwrap_or(DEFAULT_DIFFICULTY_START);

        let difficulty_end = self
            .overrides
            .difficulty_end
            .or(self.env_number("RANKING_DIFFICULTY_END")?)
            .or(document.ranking_difficulty_end)
            .unwrap_or(DEFAULT_DIFFICULTY_END);

        let volume_min = self
            .overrides
            .volume_min
            .or(self.env_number("SEARCH_VOLUME_MIN")?)
            .or(document.search_volume_min)
            .unwrap_or(DEFAULT_VOLUME_MIN);

        // Absent everywhere, or zero, means unbounded
        let volume_max = self
            .overrides
            .volume_max
            .or(self.env_number("SEARCH_VOLUME_MAX")?)
            .or(document.search_volume_max)
            .filter(|max| *max > 0);

        let sweep = SweepConfig::new(
            queries,
            difficulty_start,
            difficulty_end,
            VolumeBand::new(volume_min, volume_max),
        )?;

        let mut fetch = document.fetch.clone();
        if let Some(concurrency) = self.overrides.concurrency {
            fetch.concurrency = concurrency;
        } else if let Some(concurrency) = self.env_number::<usize>("SWEEP_CONCURRENCY")? {
            fetch.concurrency = concurrency;
        }
        if let Some(max_pages) = self.overrides.max_pages {
            fetch.max_pages = max_pages;
        }
        validate_fetch(&fetch)?;

        let mut output = document.output.clone();
        if let Some(name) = self
            .overrides
            .output_name
            .clone()
            .or_else(|| self.env_value("OUTPUT_NAME"))
            .or(document.output_name.clone())
        {
            output.name = name;
        }
        if let Some(format) = self.overrides.format {
            output.format = format;
        }
        if self.overrides.no_timestamp {
            output.timestamp = false;
        }
        output.path = self.overrides.output.clone();

        let mut pacing = document.pacing.clone();
        if pacing.min_delay_ms > pacing.max_delay_ms {
            pacing.max_delay_ms = pacing.min_delay_ms;
        }

        Ok(SweepSettings {
            sweep,
            fetch,
            pacing,
            output,
            source,
        })
    }

    fn load_document(&self) -> Result<Option<(PathBuf, ConfigDocument)>, ConfigError> {
        if let Some(path) = &self.overrides.config {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.clone()));
            }
            let document = ConfigDocument::load_from_file(path)?;
            return Ok(Some((path.clone(), document)));
        }

        for path in &self.search_paths {
            if path.is_file() {
                info!("Using configuration file: {}", path.display());
                let document = ConfigDocument::load_from_file(path)?;
                return Ok(Some((path.clone(), document)));
            }
        }

        debug!("No configuration file found");
        Ok(None)
    }

    fn env_value(&self, name: &str) -> Option<String> {
        self.env
            .get(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn env_number<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        match self.env_value(name) {
            Some(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidNumber {
                    name: name.to_string(),
                    value,
                }),
            None => Ok(None),
        }
    }
}

fn validate_fetch(fetch: &FetchSettings) -> Result<(), ConfigError> {
    if fetch.page_size == 0 {
        return Err(ConfigError::InvalidSetting("page size must be at least 1".to_string()));
    }
    if fetch.max_pages == 0 {
        return Err(ConfigError::InvalidSetting("max pages must be at least 1".to_string()));
    }
    url::Url::parse(&fetch.endpoint).map_err(|e| {
        ConfigError::InvalidSetting(format!("invalid endpoint {:?}: {}", fetch.endpoint, e))
    })?;
    Ok(())
}

/// Get the path to the per-user config directory
pub fn config_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "keyword-sweep", "keyword-sweep") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        PathBuf::from("./config")
    }
}

/// Location of the per-user default document
pub fn default_document_path() -> PathBuf {
    config_dir().join("default.yaml")
}
