//! The fetch → persist → notify cycle and the timer that drives it.

use crate::db::TelemetryStore;
use crate::errors::{FetchError, PersistError};
use crate::fetcher::TelemetryFetcher;
use crate::metrics::{
    CYCLES_TOTAL, CYCLE_DURATION_SECONDS, CYCLE_RUNNING, FETCH_FAILURES_TOTAL, SAVE_FAILURES_TOTAL,
};
use crate::model::{ApiLog, BatchReport, PropertyRecord};
use crate::notifier::AlertNotifier;
use crate::writer::Writer;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

pub const FETCH_CATEGORY: &str = "fetch";
pub const SAVE_CATEGORY: &str = "save";

const FETCH_ENDPOINT: &str = "/fetch_data";
pub(crate) const SAVE_ENDPOINT: &str = "/save_data";
const INTERNAL_ERROR: i32 = 500;

/// Writes failures to the tracing output and to the `api_logs` table.
#[derive(Clone)]
pub struct LogSink {
    store: Arc<dyn TelemetryStore>,
}

impl LogSink {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    pub async fn error(&self, message: &str, endpoint: &str, status_code: Option<i32>) {
        error!(endpoint, ?status_code, "{}", message);
        let entry = ApiLog::error(message, endpoint, status_code);
        if let Err(e) = self.store.record_log(&entry).await {
            warn!("Failed to write log entry to database: {}", e);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Saved(BatchReport),
    NoData,
    FetchFailed,
    SaveFailed,
}

/// Everything a cycle needs. Shared between the timer loop and the HTTP
/// facade.
pub struct Collector {
    fetcher: TelemetryFetcher,
    writer: Writer,
    notifier: Arc<AlertNotifier>,
    log: LogSink,
}

impl Collector {
    pub fn new(
        fetcher: TelemetryFetcher,
        store: Arc<dyn TelemetryStore>,
        notifier: Arc<AlertNotifier>,
    ) -> Self {
        Self {
            fetcher,
            writer: Writer::new(store.clone(), LogSink::new(store.clone())),
            notifier,
            log: LogSink::new(store),
        }
    }

    /// Fetches with retry. A terminal failure is logged and alerted under
    /// the `fetch` category before being handed back.
    pub async fn fetch(&self) -> Result<Vec<PropertyRecord>, FetchError> {
        let result = self.fetcher.fetch().await;
        self.report_fetch(result).await
    }

    /// Single attempt for on-demand callers that cannot sit through the
    /// retry schedule. Failures are reported the same way as [`Self::fetch`].
    pub async fn fetch_now(&self) -> Result<Vec<PropertyRecord>, FetchError> {
        let result = self.fetcher.fetch_once().await;
        self.report_fetch(result).await
    }

    async fn report_fetch(
        &self,
        result: Result<Vec<PropertyRecord>, FetchError>,
    ) -> Result<Vec<PropertyRecord>, FetchError> {
        if let Err(e) = &result {
            FETCH_FAILURES_TOTAL.inc();
            let message = format!("Failed to fetch telemetry: {}", e);
            let status = e.status_code().map(i32::from).unwrap_or(INTERNAL_ERROR);
            self.log.error(&message, FETCH_ENDPOINT, Some(status)).await;
            self.notifier.notify_once(FETCH_CATEGORY, &message).await;
        }
        result
    }

    pub async fn persist(&self, records: &[PropertyRecord]) -> Result<BatchReport, PersistError> {
        match self.writer.persist(records).await {
            Ok(report) => Ok(report),
            Err(e) => {
                SAVE_FAILURES_TOTAL.inc();
                let message = format!("Failed to save telemetry: {}", e);
                self.log.error(&message, SAVE_ENDPOINT, Some(INTERNAL_ERROR)).await;
                self.notifier.notify_once(SAVE_CATEGORY, &message).await;
                Err(e)
            }
        }
    }

    /// One fetch-then-persist pass. Never fails: every error is already
    /// reported by the time this returns.
    pub async fn run_cycle(&self) -> CycleOutcome {
        CYCLES_TOTAL.inc();
        let start = Instant::now();

        let outcome = match self.fetch().await {
            Err(_) => CycleOutcome::FetchFailed,
            Ok(records) if records.is_empty() => {
                info!("No property records returned, nothing to save");
                CycleOutcome::NoData
            }
            Ok(records) => match self.persist(&records).await {
                Ok(report) => {
                    info!("Saved {} readings ({} skipped)", report.saved, report.skipped);
                    CycleOutcome::Saved(report)
                }
                Err(_) => CycleOutcome::SaveFailed,
            },
        };

        CYCLE_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
        outcome
    }
}

/// Runs cycles forever, waiting `interval` after each one completes.
pub async fn run_poll_loop(collector: Arc<Collector>, interval: Duration) {
    info!("Starting poll loop with interval={:?}", interval);

    loop {
        let cycle_id = uuid::Uuid::new_v4();
        CYCLE_RUNNING.set(1.0);
        let outcome = collector
            .run_cycle()
            .instrument(info_span!("cycle", id = %cycle_id))
            .await;
        CYCLE_RUNNING.set(0.0);

        if !matches!(outcome, CycleOutcome::Saved(_) | CycleOutcome::NoData) {
            warn!("Cycle {} ended with {:?}", cycle_id, outcome);
        }

        tokio::time::sleep(interval).await;
    }
}
