//! In-memory doubles for the store and the mail relay, plus mockito helpers.

use crate::db::TelemetryStore;
use crate::errors::{FetchError, NotifyError, PersistError};
use crate::fetcher::TelemetryFetcher;
use crate::model::{ApiLog, BatchReport, Reading};
use crate::notifier::{AlertNotifier, Mailer, SentAlerts};
use crate::poll::Collector;
use crate::retry::RetryPolicy;
use crate::token::{ClientCredentials, TokenProvider};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryStore {
    readings: Mutex<Vec<Reading>>,
    logs: Mutex<Vec<ApiLog>>,
    fail_batches: bool,
}

impl MemoryStore {
    pub fn failing_batches() -> Self {
        Self {
            fail_batches: true,
            ..Default::default()
        }
    }

    pub fn readings(&self) -> Vec<Reading> {
        self.readings.lock().unwrap().clone()
    }

    pub fn logs(&self) -> Vec<ApiLog> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn save_readings(&self, readings: &[Reading]) -> Result<BatchReport, PersistError> {
        if self.fail_batches {
            return Err(PersistError::Database(sqlx::Error::PoolClosed));
        }
        self.readings.lock().unwrap().extend_from_slice(readings);
        Ok(BatchReport {
            saved: readings.len(),
            skipped: 0,
        })
    }

    async fn record_log(&self, entry: &ApiLog) -> Result<(), PersistError> {
        self.logs.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Delivered (subject, body) pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            let err = "not an address"
                .parse::<lettre::message::Mailbox>()
                .unwrap_err();
            return Err(err.into());
        }
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// A well-formed property record as the cloud API returns it.
pub fn property(id: &str, last_value: Value) -> Value {
    json!({
        "created_at": "2024-05-20T10:15:30.123456Z",
        "updated_at": "2024-05-20T10:16:00.000001Z",
        "value_updated_at": "2024-05-20T10:16:00",
        "last_value": last_value,
        "href": format!("/iot/v1/things/t-1/properties/{}", id),
        "id": id,
        "linked_to_trigger": false,
        "name": "temperature",
        "permission": "READ_ONLY",
        "persist": true,
        "tag": 1,
        "thing_id": "t-1",
        "thing_name": "cold-room",
        "type": "TEMPERATURE_C",
        "update_parameter": 0,
        "update_strategy": "ON_CHANGE",
        "variable_name": "temperature"
    })
}

pub async fn mock_token(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/iot/v1/clients/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"tok-test","token_type":"Bearer"}"#)
        .expect_at_least(1)
        .create_async()
        .await
}

pub fn quick_retry(attempts: u32) -> RetryPolicy<FetchError> {
    RetryPolicy::fixed(attempts, Duration::from_millis(5), FetchError::is_retryable)
}

pub fn fetcher_with(
    token_url: &str,
    properties_url: &str,
    retry: RetryPolicy<FetchError>,
    timeout: Duration,
) -> TelemetryFetcher {
    let client = reqwest::Client::builder().timeout(timeout).build().unwrap();
    let tokens = TokenProvider::new(
        client.clone(),
        ClientCredentials {
            token_url: token_url.to_string(),
            client_id: "client-a".to_string(),
            client_secret: "s3cret".to_string(),
            audience: "https://api.example.test/iot".to_string(),
        },
    );
    TelemetryFetcher::new(client, tokens, properties_url.to_string(), retry)
}

pub fn fetcher_at(token_url: &str, properties_url: &str, attempts: u32) -> TelemetryFetcher {
    fetcher_with(
        token_url,
        properties_url,
        quick_retry(attempts),
        Duration::from_secs(5),
    )
}

pub fn fetcher_for(server: &mockito::ServerGuard, attempts: u32) -> TelemetryFetcher {
    fetcher_for_policy(server, quick_retry(attempts))
}

pub fn fetcher_for_policy(
    server: &mockito::ServerGuard,
    retry: RetryPolicy<FetchError>,
) -> TelemetryFetcher {
    fetcher_with(
        &format!("{}/iot/v1/clients/token", server.url()),
        &format!("{}/iot/v2/things/t-1/properties", server.url()),
        retry,
        Duration::from_secs(5),
    )
}

pub fn collector_for(
    server: &mockito::ServerGuard,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
) -> Collector {
    collector_with_alerts(server, store, mailer, SentAlerts::new())
}

pub fn collector_with_alerts(
    server: &mockito::ServerGuard,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
    alerts: SentAlerts,
) -> Collector {
    collector_with_fetcher(fetcher_for(server, 2), store, mailer, alerts)
}

pub fn collector_with_fetcher(
    fetcher: TelemetryFetcher,
    store: Arc<MemoryStore>,
    mailer: Arc<RecordingMailer>,
    alerts: SentAlerts,
) -> Collector {
    let notifier = Arc::new(AlertNotifier::new(mailer, alerts));
    Collector::new(fetcher, store, notifier)
}
