use crate::db::TelemetryStore;
use crate::errors::PersistError;
use crate::metrics::{READINGS_SAVED_TOTAL, READINGS_SKIPPED_TOTAL};
use crate::model::{BatchReport, PropertyRecord};
use crate::poll::{LogSink, SAVE_ENDPOINT};
use crate::validate::validate;
use std::sync::Arc;
use tracing::debug;

/// Maps raw property records to rows and hands them to the store.
#[derive(Clone)]
pub struct Writer {
    store: Arc<dyn TelemetryStore>,
    log: LogSink,
}

impl Writer {
    pub fn new(store: Arc<dyn TelemetryStore>, log: LogSink) -> Self {
        Self { store, log }
    }

    /// Malformed records are skipped one by one, each leaving a log entry.
    /// An error here means the batch as a whole could not be written.
    pub async fn persist(&self, records: &[PropertyRecord]) -> Result<BatchReport, PersistError> {
        let mut readings = Vec::with_capacity(records.len());
        let mut rejected = 0;

        for record in records {
            match validate(record) {
                Ok(reading) => readings.push(reading),
                Err(e) => {
                    let message = format!("Skipping invalid property record {}: {}", record, e);
                    self.log.error(&message, SAVE_ENDPOINT, None).await;
                    rejected += 1;
                }
            }
        }

        let mut report = self.store.save_readings(&readings).await?;
        report.skipped += rejected;

        READINGS_SAVED_TOTAL.inc_by(report.saved as f64);
        READINGS_SKIPPED_TOTAL.inc_by(report.skipped as f64);
        debug!("Persisted {} readings, skipped {}", report.saved, report.skipped);

        Ok(report)
    }
}
