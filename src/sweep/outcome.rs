use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::ErrorKind;
use crate::sweep::{KeywordRecord, SweepCell};
use crate::utils::{CellStatus, SweepMetrics};

/// Result of fetching every page of one cell
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success {
        cell: SweepCell,
        records: Vec<KeywordRecord>,
        pages: u32,
    },
    /// A page failed; `records` holds what earlier pages returned
    Failure {
        failure: CellFailure,
        records: Vec<KeywordRecord>,
    },
    /// Cancellation stopped pagination before the cell was exhausted
    Interrupted {
        cell: SweepCell,
        records: Vec<KeywordRecord>,
        pages: u32,
    },
}

impl FetchOutcome {
    pub fn status(&self) -> CellStatus {
        match self {
            FetchOutcome::Success { .. } => CellStatus::Succeeded,
            FetchOutcome::Failure { .. } => CellStatus::Failed,
            FetchOutcome::Interrupted { .. } => CellStatus::Interrupted,
        }
    }
}

/// Diagnostic entry for a cell whose pagination stopped on an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellFailure {
    pub cell: SweepCell,
    pub kind: ErrorKind,
    pub message: String,
    /// Pages retrieved before the failing one
    pub pages_fetched: u32,
}

/// Everything a finished (or cancelled) sweep produced
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub total_cells: usize,
    pub records: Vec<KeywordRecord>,
    pub failures: Vec<CellFailure>,
    /// Cells never started because the run was cancelled
    pub skipped: Vec<SweepCell>,
    /// Cells stopped mid-pagination by cancellation
    pub interrupted: Vec<SweepCell>,
    pub metrics: SweepMetrics,
}

impl SweepReport {
    /// Every cell ran to exhaustion
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty() && self.interrupted.is_empty()
    }

    pub fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            cells = self.total_cells,
            records = self.records.len(),
            failed = self.failures.len(),
            skipped = self.skipped.len(),
            interrupted = self.interrupted.len(),
            requests = self.metrics.total_requests,
            retries = self.metrics.retries,
            avg_request_ms = self.metrics.average_request_ms().round(),
            requests_per_second = self.metrics.requests_per_second(),
            peak_in_flight = self.metrics.peak_cells_in_flight,
            "Sweep finished"
        );

        for failure in &self.failures {
            warn!(
                query = %failure.cell.query,
                difficulty = failure.cell.difficulty,
                kind = %failure.kind,
                pages_fetched = failure.pages_fetched,
                "Cell failed: {}",
                failure.message
            );
        }

        if !self.skipped.is_empty() || !self.interrupted.is_empty() {
            warn!(
                "Run was cancelled: {} cells not started, {} cells incomplete",
                self.skipped.len(),
                self.interrupted.len()
            );
        }
    }
}
