use crate::errors::FetchError;
use crate::model::PropertyRecord;
use crate::retry::RetryPolicy;
use crate::token::TokenProvider;
use serde_json::Value;
use tracing::{debug, info};

/// Placeholder substituted with the thing identifier in the API URL template.
pub const THING_ID_PLACEHOLDER: &str = "{thing_id}";

pub fn property_url(template: &str, thing_id: &str) -> String {
    template.replace(THING_ID_PLACEHOLDER, thing_id)
}

/// Reads a thing's properties from the telemetry API.
#[derive(Debug, Clone)]
pub struct TelemetryFetcher {
    client: reqwest::Client,
    tokens: TokenProvider,
    url: String,
    retry: RetryPolicy<FetchError>,
}

impl TelemetryFetcher {
    /// `client` is expected to carry the request timeout.
    pub fn new(
        client: reqwest::Client,
        tokens: TokenProvider,
        url: String,
        retry: RetryPolicy<FetchError>,
    ) -> Self {
        Self {
            client,
            tokens,
            url,
            retry,
        }
    }

    /// Fetches with retry. Returns the last failure once attempts run out.
    pub async fn fetch(&self) -> Result<Vec<PropertyRecord>, FetchError> {
        self.retry
            .run(|attempt| async move {
                debug!("Fetching telemetry (attempt {})", attempt);
                self.fetch_once().await
            })
            .await
    }

    /// A single attempt with no retry.
    pub async fn fetch_once(&self) -> Result<Vec<PropertyRecord>, FetchError> {
        let token = self.tokens.acquire_token().await?;

        let response = self
            .client
            .get(&self.url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let records = normalize(body);
        info!("Fetched {} property records", records.len());
        Ok(records)
    }
}

/// Arrays become their elements, `null` becomes nothing, and any other value
/// becomes a single record.
pub fn normalize(body: Value) -> Vec<PropertyRecord> {
    match body {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
