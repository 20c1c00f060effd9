use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cli::config::ConfigError;

/// One (query, difficulty) combination of the sweep
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SweepCell {
    pub query: String,
    pub difficulty: i64,
}

impl fmt::Display for SweepCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {})", self.query, self.difficulty)
    }
}

/// Search volume filter shared by every cell. `max: None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBand {
    pub min: u64,
    pub max: Option<u64>,
}

impl VolumeBand {
    pub fn new(min: u64, max: Option<u64>) -> Self {
        Self { min, max }
    }
}

/// Parameters of a sweep, resolved once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepConfig {
    pub queries: Vec<String>,
    pub difficulty_start: i64,
    pub difficulty_end: i64,
    pub volume: VolumeBand,
}

impl SweepConfig {
    /// Build a config, trimming queries and dropping blank ones
    pub fn new(
        queries: Vec<String>,
        difficulty_start: i64,
        difficulty_end: i64,
        volume: VolumeBand,
    ) -> Result<Self, ConfigError> {
        let queries = queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();

        let config = Self {
            queries,
            difficulty_start,
            difficulty_end,
            volume,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queries.is_empty() || self.queries.iter().any(|q| q.trim().is_empty()) {
            return Err(ConfigError::EmptyQueries);
        }

        if self.difficulty_start > self.difficulty_end {
            return Err(ConfigError::InvertedDifficulty {
                start: self.difficulty_start,
                end: self.difficulty_end,
            });
        }

        if let Some(max) = self.volume.max {
            if max < self.volume.min {
                return Err(ConfigError::InvertedVolume {
                    min: self.volume.min,
                    max,
                });
            }
        }

        Ok(())
    }
}

/// The cross product of queries and difficulties.
///
/// Cells are derived on demand: queries in input order on the outside,
/// difficulties ascending on the inside.
#[derive(Debug, Clone)]
pub struct SweepSpace {
    config: SweepConfig,
}

impl SweepSpace {
    pub fn new(config: SweepConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn cells(&self) -> impl Iterator<Item = SweepCell> + '_ {
        let (start, end) = (self.config.difficulty_start, self.config.difficulty_end);
        self.config.queries.iter().flat_map(move |query| {
            (start..=end).map(move |difficulty| SweepCell {
                query: query.clone(),
                difficulty,
            })
        })
    }

    /// Number of cells, saturating for ranges wider than `usize`
    pub fn len(&self) -> usize {
        self.config.queries.len().saturating_mul(self.difficulty_span())
    }

    pub fn volume_band(&self) -> VolumeBand {
        self.config.volume
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    fn difficulty_span(&self) -> usize {
        let span = i128::from(self.config.difficulty_end) - i128::from(self.config.difficulty_start) + 1;
        usize::try_from(span).unwrap_or(usize::MAX)
    }
}
