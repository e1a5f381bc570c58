use chrono::{DateTime, Utc};
use serde::Serialize;

/// A property record exactly as the telemetry API returned it.
pub type PropertyRecord = serde_json::Value;

/// One device property snapshot, ready to be written as a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub property_id: String,
    pub href: Option<String>,
    pub name: Option<String>,
    pub last_value: f64,
    pub value_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub value_updated_at: Option<DateTime<Utc>>,
    pub linked_to_trigger: Option<bool>,
    pub permission: Option<String>,
    pub persist: Option<bool>,
    pub tag: Option<i64>,
    pub thing_id: Option<String>,
    pub thing_name: Option<String>,
    pub update_parameter: Option<f64>,
    pub update_strategy: Option<String>,
    pub variable_name: Option<String>,
}

/// A row destined for the `api_logs` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiLog {
    pub log_level: String,
    pub message: String,
    pub endpoint: Option<String>,
    pub status_code: Option<i32>,
}

impl ApiLog {
    pub fn error(message: impl Into<String>, endpoint: &str, status_code: Option<i32>) -> Self {
        Self {
            log_level: "ERROR".to_string(),
            message: message.into(),
            endpoint: Some(endpoint.to_string()),
            status_code,
        }
    }
}

/// Outcome of one persist call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub saved: usize,
    pub skipped: usize,
}
