use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Sweep metrics collector
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// In-memory metrics store
    metrics: Arc<Mutex<SweepMetrics>>,
}

/// Metrics data structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SweepMetrics {
    /// Start time of the metrics collection
    pub start_time: DateTime<Utc>,

    /// Page requests made, retries included
    pub total_requests: usize,

    pub successful_requests: usize,

    pub failed_requests: usize,

    /// Requests repeated after a transient failure
    pub retries: usize,

    /// Keyword records received
    pub records_fetched: usize,

    pub cells_succeeded: usize,

    pub cells_failed: usize,

    /// Cells stopped by cancellation before running out of pages
    pub cells_interrupted: usize,

    /// Cells currently holding a worker slot
    pub cells_in_flight: usize,

    /// Highest number of cells in flight at once
    pub peak_cells_in_flight: usize,

    /// Request durations in milliseconds
    pub request_durations: Vec<u64>,

    /// HTTP status code counts for failed requests
    pub status_codes: HashMap<u16, usize>,
}

/// How a cell released its worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Succeeded,
    Failed,
    Interrupted,
}

impl SweepMetrics {
    /// Mean request duration in milliseconds
    pub fn average_request_ms(&self) -> f64 {
        if self.request_durations.is_empty() {
            return 0.0;
        }
        self.request_durations.iter().sum::<u64>() as f64 / self.request_durations.len() as f64
    }

    /// Page requests per second since collection started
    pub fn requests_per_second(&self) -> f64 {
        let elapsed_seconds = (Utc::now() - self.start_time).num_milliseconds().max(1) as f64 / 1000.0;
        self.total_requests as f64 / elapsed_seconds
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let metrics = SweepMetrics {
            start_time: Utc::now(),
            ..Default::default()
        };

        Self {
            metrics: Arc::new(Mutex::new(metrics)),
        }
    }

    /// Record a page request
    pub async fn record_request(&self, success: bool, duration_ms: u64, status_code: Option<u16>, records: usize) {
        let mut metrics = self.metrics.lock().await;

        metrics.total_requests += 1;

        if success {
            metrics.successful_requests += 1;
            metrics.records_fetched += records;
        } else {
            metrics.failed_requests += 1;
        }

        metrics.request_durations.push(duration_ms);

        if let Some(code) = status_code {
            *metrics.status_codes.entry(code).or_default() += 1;
        }
    }

    pub async fn record_retry(&self) {
        self.metrics.lock().await.retries += 1;
    }

    /// A cell acquired a worker slot
    pub async fn cell_started(&self) {
        let mut metrics = self.metrics.lock().await;
        metrics.cells_in_flight += 1;
        metrics.peak_cells_in_flight = metrics.peak_cells_in_flight.max(metrics.cells_in_flight);
    }

    /// A cell released its worker slot
    pub async fn cell_finished(&self, status: CellStatus) {
        let mut metrics = self.metrics.lock().await;
        metrics.cells_in_flight = metrics.cells_in_flight.saturating_sub(1);

        match status {
            CellStatus::Succeeded => metrics.cells_succeeded += 1,
            CellStatus::Failed => metrics.cells_failed += 1,
            CellStatus::Interrupted => metrics.cells_interrupted += 1,
        }
    }

    /// Start timing a request
    pub fn start_timer(&self) -> RequestTimer {
        RequestTimer {
            start: Instant::now(),
        }
    }

    /// Get all metrics
    pub async fn get_metrics(&self) -> SweepMetrics {
        self.metrics.lock().await.clone()
    }
}

/// Request timer for measuring request durations
pub struct RequestTimer {
    /// Start time of the request
    start: Instant,
}

impl RequestTimer {
    /// End timing and get the duration in milliseconds
    pub fn end(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
