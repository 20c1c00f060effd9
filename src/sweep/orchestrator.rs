use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{FetchError, KeywordApiClient, PageRequest, RawKeyword};
use crate::cli::config::{ConfigError, FetchSettings};
use crate::sweep::pacing::RequestPacer;
use crate::sweep::{
    CellFailure, FetchOutcome, KeywordRecord, ResultAggregator, SweepCell, SweepConfig, SweepReport, SweepSpace,
    VolumeBand,
};
use crate::utils::MetricsCollector;

const MAX_BACKOFF_MS: u64 = 30_000;

/// Drives every cell of a sweep through the API client.
///
/// Cells run concurrently up to the concurrency limit; pages within a cell
/// are requested strictly one after another.
#[derive(Clone)]
pub struct FetchOrchestrator {
    client: Arc<dyn KeywordApiClient>,
    pacer: Arc<dyn RequestPacer>,
    settings: Arc<FetchSettings>,
    metrics: MetricsCollector,
    cancel: CancellationToken,
}

/// What a finished cell task hands back for the report
enum CellResult {
    Done,
    Failed(CellFailure),
    Interrupted(SweepCell),
}

impl FetchOrchestrator {
    pub fn new(
        client: Arc<dyn KeywordApiClient>,
        pacer: Arc<dyn RequestPacer>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            client,
            pacer,
            settings: Arc::new(settings),
            metrics: MetricsCollector::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the whole sweep.
    ///
    /// Only an invalid configuration is an error; it is reported before any
    /// request is sent. Cell failures end up in the report.
    pub async fn run(&self, config: SweepConfig, concurrency_limit: usize) -> Result<SweepReport, ConfigError> {
        let space = SweepSpace::new(config)?;
        let run_id = Uuid::new_v4();
        let limit = concurrency_limit.max(1);
        let band = space.volume_band();

        info!(
            %run_id,
            cells = space.len(),
            queries = space.config().queries.len(),
            concurrency = limit,
            "Starting sweep"
        );

        let aggregator = ResultAggregator::new();
        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();
        let mut skipped = Vec::new();

        for cell in space.cells() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                skipped.push(cell);
                continue;
            };

            let worker = self.clone();
            let aggregator = aggregator.clone();

            tasks.spawn(async move {
                worker.metrics.cell_started().await;
                let outcome = worker.fetch_cell(cell, band).await;
                worker.metrics.cell_finished(outcome.status()).await;

                let result = match outcome {
                    FetchOutcome::Success { cell, records, pages } => {
                        let count = records.len();
                        let total = aggregator.append(&cell.query, records).await;
                        debug!(
                            query = %cell.query,
                            difficulty = cell.difficulty,
                            pages,
                            records = count,
                            total,
                            "Cell complete"
                        );
                        CellResult::Done
                    }
                    FetchOutcome::Failure { failure, records } => {
                        aggregator.append(&failure.cell.query, records).await;
                        CellResult::Failed(failure)
                    }
                    FetchOutcome::Interrupted { cell, records, pages } => {
                        debug!(
                            query = %cell.query,
                            difficulty = cell.difficulty,
                            pages,
                            records = records.len(),
                            "Cell interrupted"
                        );
                        aggregator.append(&cell.query, records).await;
                        CellResult::Interrupted(cell)
                    }
                };

                drop(permit);
                result
            });
        }

        if !skipped.is_empty() {
            warn!("Cancellation requested; {} cells will not be fetched", skipped.len());
        }

        let mut failures = Vec::new();
        let mut interrupted = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(CellResult::Done) => {}
                Ok(CellResult::Failed(failure)) => failures.push(failure),
                Ok(CellResult::Interrupted(cell)) => interrupted.push(cell),
                Err(e) => error!("Cell task did not complete: {}", e),
            }
        }

        debug!(%run_id, records = aggregator.len().await, "All cell tasks joined");

        Ok(SweepReport {
            run_id,
            total_cells: space.len(),
            records: aggregator.into_records().await,
            failures,
            skipped,
            interrupted,
            metrics: self.metrics.get_metrics().await,
        })
    }

    /// Fetch every page of one cell
    async fn fetch_cell(&self, cell: SweepCell, band: VolumeBand) -> FetchOutcome {
        let page_size = self.settings.page_size;
        let mut records: Vec<KeywordRecord> = Vec::new();
        let mut pages = 0u32;

        loop {
            if pages >= self.settings.max_pages {
                warn!(
                    query = %cell.query,
                    difficulty = cell.difficulty,
                    max_pages = self.settings.max_pages,
                    "Page limit reached; stopping pagination"
                );
                break;
            }

            if self.cancel.is_cancelled() {
                return FetchOutcome::Interrupted { cell, records, pages };
            }

            let request = PageRequest::for_page(&cell, band, pages, page_size);

            match self.fetch_with_retry(&request).await {
                Ok(page) => {
                    if page.is_empty() {
                        break;
                    }

                    pages += 1;
                    let count = page.len();
                    records.extend(page.iter().map(|raw| KeywordRecord::from_raw(&cell.query, raw)));

                    debug!(
                        query = %cell.query,
                        difficulty = cell.difficulty,
                        page = pages,
                        count,
                        "Fetched page"
                    );

                    if count < page_size as usize {
                        break;
                    }
                }
                Err(e) if e.is_transient() && self.cancel.is_cancelled() => {
                    return FetchOutcome::Interrupted { cell, records, pages };
                }
                Err(e) => {
                    warn!(
                        query = %cell.query,
                        difficulty = cell.difficulty,
                        page = pages + 1,
                        kept = records.len(),
                        "Cell failed: {}",
                        e
                    );
                    return FetchOutcome::Failure {
                        failure: CellFailure {
                            cell,
                            kind: e.kind(),
                            message: e.to_string(),
                            pages_fetched: pages,
                        },
                        records,
                    };
                }
            }
        }

        FetchOutcome::Success { cell, records, pages }
    }

    /// Request one page, repeating transient failures with exponential backoff
    async fn fetch_with_retry(&self, request: &PageRequest) -> Result<Vec<RawKeyword>, FetchError> {
        let mut attempt = 0u32;

        loop {
            self.pacer.wait().await;

            let timer = self.metrics.start_timer();
            let result = self.client.fetch_page(request).await;
            let elapsed = timer.end();

            let error = match result {
                Ok(page) => {
                    self.metrics.record_request(true, elapsed, None, page.len()).await;
                    return Ok(page);
                }
                Err(e) => e,
            };

            self.metrics.record_request(false, elapsed, error.status_code(), 0).await;

            if !error.is_transient() || attempt >= self.settings.max_retries {
                return Err(error);
            }

            let delay = self.backoff(attempt);
            attempt += 1;
            warn!(
                query = %request.query,
                difficulty = request.difficulty,
                starting_row = request.starting_row,
                attempt,
                "Retrying in {} ms after: {}",
                delay.as_millis(),
                error
            );
            self.metrics.record_retry().await;

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(error),
                _ = sleep(delay) => {}
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(
            self.settings
                .retry_backoff_ms
                .saturating_mul(factor)
                .min(MAX_BACKOFF_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorKind;
    use crate::sweep::pacing::NoPacing;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    type Responder = dyn Fn(&PageRequest, usize) -> Result<Vec<RawKeyword>, FetchError> + Send + Sync;

    /// Scripted client. The responder receives the request and how many
    /// times that exact request has been seen before.
    struct FakeClient {
        responder: Box<Responder>,
        calls: AtomicUsize,
        seen: StdMutex<Vec<PageRequest>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        latency: Duration,
    }

    impl FakeClient {
        fn new(
            responder: impl Fn(&PageRequest, usize) -> Result<Vec<RawKeyword>, FetchError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                calls: AtomicUsize::new(0),
                seen: StdMutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                latency: Duration::ZERO,
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn starting_rows(&self, difficulty: i64) -> Vec<u64> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.difficulty == difficulty)
                .map(|r| r.starting_row)
                .collect()
        }
    }

    #[async_trait]
    impl KeywordApiClient for FakeClient {
        async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawKeyword>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }

            let previous = {
                let mut seen = self.seen.lock().unwrap();
                let previous = seen.iter().filter(|r| *r == request).count();
                seen.push(request.clone());
                previous
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.responder)(request, previous)
        }
    }

    fn keywords(count: usize, prefix: &str) -> Vec<RawKeyword> {
        (0..count)
            .map(|i| RawKeyword {
                keyword: Some(json!(format!("{} {}", prefix, i))),
                search_volume: Some(json!(1000)),
                ranking_difficulty: Some(json!(1)),
                cpc: None,
            })
            .collect()
    }

    fn settings() -> FetchSettings {
        FetchSettings {
            page_size: 50,
            max_pages: 20,
            max_retries: 2,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn orchestrator(client: Arc<FakeClient>, settings: FetchSettings) -> FetchOrchestrator {
        FetchOrchestrator::new(client, Arc::new(NoPacing), settings)
    }

    fn config(queries: &[&str], start: i64, end: i64) -> SweepConfig {
        SweepConfig {
            queries: queries.iter().map(|q| q.to_string()).collect(),
            difficulty_start: start,
            difficulty_end: end,
            volume: VolumeBand::new(500, None),
        }
    }

    #[tokio::test]
    async fn test_single_cell_single_page() {
        let client = Arc::new(FakeClient::new(|request, _| {
            assert_eq!(request.difficulty, 1);
            Ok(keywords(2, "seo"))
        }));
        let report = orchestrator(client.clone(), settings())
            .run(config(&["seo tools"], 1, 1), 10)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 2);
        assert!(report.records.iter().all(|r| r.query == "seo tools"));
        assert!(report.failures.is_empty());
        assert!(report.is_complete());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_cell_does_not_stop_the_sweep() {
        let client = Arc::new(FakeClient::new(|request, _| {
            if request.difficulty == 2 {
                Err(FetchError::Transport("connection reset".to_string()))
            } else {
                Ok(keywords(3, &format!("d{}", request.difficulty)))
            }
        }));
        let report = orchestrator(client.clone(), settings())
            .run(config(&["crm"], 1, 3), 4)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 6);
        assert!(report.records.iter().any(|r| r.keyword.starts_with("d1")));
        assert!(report.records.iter().any(|r| r.keyword.starts_with("d3")));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].cell,
            SweepCell {
                query: "crm".to_string(),
                difficulty: 2
            }
        );
        assert_eq!(report.failures[0].kind, ErrorKind::Transport);
        // One attempt plus two retries for the failing cell
        assert_eq!(client.calls(), 2 + 3);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_inverted_range_makes_no_calls() {
        let client = Arc::new(FakeClient::new(|_, _| Ok(vec![])));
        let err = orchestrator(client.clone(), settings())
            .run(config(&["seo tools"], 5, 1), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvertedDifficulty { start: 5, end: 1 }));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_pagination_stops_at_short_page() {
        let client = Arc::new(FakeClient::new(|request, _| match request.starting_row {
            1 | 51 => Ok(keywords(50, "full")),
            101 => Ok(keywords(10, "short")),
            row => panic!("unexpected starting row {}", row),
        }));
        let report = orchestrator(client.clone(), settings())
            .run(config(&["q"], 1, 1), 1)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 110);
        assert_eq!(client.starting_rows(1), vec![1, 51, 101]);
        // Page order within a cell is request order
        assert_eq!(report.records[0].keyword, "full 0");
        assert_eq!(report.records[109].keyword, "short 9");
    }

    #[tokio::test]
    async fn test_empty_first_page_is_success_without_records() {
        let client = Arc::new(FakeClient::new(|_, _| Ok(vec![])));
        let report = orchestrator(client.clone(), settings())
            .run(config(&["q"], 1, 1), 1)
            .await
            .unwrap();

        assert!(report.records.is_empty());
        assert!(report.is_complete());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_page_size_ends_on_empty_page() {
        let client = Arc::new(FakeClient::new(|request, _| {
            if request.starting_row == 1 {
                Ok(keywords(50, "only"))
            } else {
                Ok(vec![])
            }
        }));
        let report = orchestrator(client.clone(), settings())
            .run(config(&["q"], 1, 1), 1)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 50);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_partial_pages_kept_when_cell_fails() {
        let client = Arc::new(FakeClient::new(|request, _| match request.starting_row {
            1 | 51 => Ok(keywords(50, "kept")),
            _ => Err(FetchError::Status { status: 404 }),
        }));
        let report = orchestrator(client.clone(), settings())
            .run(config(&["q"], 7, 7), 1)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 100);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].pages_fetched, 2);
        assert_eq!(report.failures[0].kind, ErrorKind::Upstream);
        // 404 is permanent, so no retry
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn test_page_cap_guards_endless_upstream() {
        let client = Arc::new(FakeClient::new(|_, _| Ok(keywords(50, "loop"))));
        let capped = FetchSettings {
            max_pages: 3,
            ..settings()
        };
        let report = orchestrator(client.clone(), capped)
            .run(config(&["q"], 1, 1), 1)
            .await
            .unwrap();

        assert_eq!(client.calls(), 3);
        assert_eq!(report.records.len(), 150);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let client = Arc::new(FakeClient::new(|_, previous| {
            if previous == 0 {
                Err(FetchError::Status { status: 503 })
            } else {
                Ok(keywords(4, "after retry"))
            }
        }));
        let orchestrator = orchestrator(client.clone(), settings());
        let report = orchestrator.run(config(&["q"], 1, 1), 1).await.unwrap();

        assert_eq!(report.records.len(), 4);
        assert!(report.failures.is_empty());
        assert_eq!(client.calls(), 2);
        assert_eq!(report.metrics.retries, 1);
        assert_eq!(report.metrics.failed_requests, 1);
        assert_eq!(report.metrics.status_codes.get(&503), Some(&1));
    }

    #[tokio::test]
    async fn test_malformed_response_is_not_retried() {
        let client = Arc::new(FakeClient::new(|_, _| Err(FetchError::Malformed("eof".to_string()))));
        let report = orchestrator(client.clone(), settings())
            .run(config(&["q"], 1, 1), 1)
            .await
            .unwrap();

        assert_eq!(client.calls(), 1);
        assert_eq!(report.failures[0].kind, ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_every_record_lands_in_the_aggregate() {
        let client = Arc::new(FakeClient::new(|request, _| {
            Ok(keywords(request.difficulty as usize, &request.query))
        }));
        let report = orchestrator(client, settings())
            .run(config(&["a", "b"], 1, 4), 3)
            .await
            .unwrap();

        // (1 + 2 + 3 + 4) records per query
        assert_eq!(report.records.len(), 20);
        assert_eq!(report.records.iter().filter(|r| r.query == "a").count(), 10);
        assert_eq!(report.metrics.records_fetched, 20);
        assert_eq!(report.metrics.cells_succeeded, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_limit_is_respected() {
        let client = Arc::new(
            FakeClient::new(|_, _| Ok(keywords(1, "k"))).with_latency(Duration::from_millis(20)),
        );
        let report = orchestrator(client.clone(), settings())
            .run(config(&["a", "b", "c", "d"], 1, 5), 3)
            .await
            .unwrap();

        assert_eq!(report.records.len(), 20);
        assert!(client.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert!(report.metrics.peak_cells_in_flight <= 3);
        assert!(report.metrics.peak_cells_in_flight >= 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_schedules_nothing() {
        let client = Arc::new(FakeClient::new(|_, _| Ok(keywords(1, "k"))));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = orchestrator(client.clone(), settings())
            .with_cancellation(cancel)
            .run(config(&["a"], 1, 5), 2)
            .await
            .unwrap();

        assert_eq!(client.calls(), 0);
        assert!(report.records.is_empty());
        assert_eq!(report.skipped.len(), 5);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_cancel_mid_run_keeps_appended_records() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let client = Arc::new(FakeClient::new(move |request, _| {
            if request.difficulty == 2 {
                trigger.cancel();
            }
            Ok(keywords(1, "k"))
        }));
        let report = orchestrator(client.clone(), settings())
            .with_cancellation(cancel)
            .run(config(&["a"], 1, 10), 1)
            .await
            .unwrap();

        // Cells 1 and 2 finished before the token was observed
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.skipped.len(), 8);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancel_during_full_page_interrupts_cell() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let client = Arc::new(FakeClient::new(move |request, _| {
            assert_eq!(request.starting_row, 1, "no page may follow the cancelled one");
            trigger.cancel();
            Ok(keywords(50, "full"))
        }));
        let report = orchestrator(client.clone(), settings())
            .with_cancellation(cancel)
            .run(config(&["q"], 1, 1), 1)
            .await
            .unwrap();

        assert_eq!(client.calls(), 1);
        assert_eq!(report.records.len(), 50);
        assert!(report.failures.is_empty());
        assert_eq!(
            report.interrupted,
            vec![SweepCell {
                query: "q".to_string(),
                difficulty: 1
            }]
        );
        assert_eq!(report.metrics.cells_interrupted, 1);
        assert_eq!(report.metrics.cells_failed, 0);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_cancel_during_retry_backoff_interrupts_cell() {
        let cancel = CancellationToken::new();
        let client = Arc::new(FakeClient::new(|_, _| Err(FetchError::Status { status: 503 })));
        let slow_retry = FetchSettings {
            retry_backoff_ms: 10_000,
            ..settings()
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let report = orchestrator(client.clone(), slow_retry)
            .with_cancellation(cancel)
            .run(config(&["q"], 1, 1), 1)
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(client.calls(), 1);
        assert!(report.records.is_empty());
        assert!(report.failures.is_empty());
        assert_eq!(report.interrupted.len(), 1);
        assert_eq!(report.metrics.retries, 1);
        assert_eq!(report.metrics.cells_interrupted, 1);
    }
}
