use crate::errors::{PersistError, Result};
use crate::model::{ApiLog, BatchReport, Reading};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Connection, Row};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const INSERT_READING: &str = r#"
    INSERT INTO property_readings (
        created_at, href, property_id, last_value, linked_to_trigger,
        name, permission, persist, tag, thing_id, thing_name,
        value_type, update_parameter, update_strategy, updated_at, value_updated_at, variable_name
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
    "#;

const INSERT_LOG: &str = r#"
    INSERT INTO api_logs (log_level, message, endpoint, status_code)
    VALUES ($1, $2, $3, $4)
    "#;

const SELECT_PARAMETERS: &str = "SELECT name, value FROM system_parameters";

/// Where readings and operational logs end up.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Inserts the batch and commits once. Rows the database rejects are
    /// skipped; only a batch-level failure is returned as an error.
    async fn save_readings(&self, readings: &[Reading]) -> std::result::Result<BatchReport, PersistError>;

    async fn record_log(&self, entry: &ApiLog) -> std::result::Result<(), PersistError>;
}

pub async fn make_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Reads the `system_parameters` table into a name → value map.
    pub async fn load_parameters(&self) -> std::result::Result<HashMap<String, String>, sqlx::Error> {
        let rows = sqlx::query(SELECT_PARAMETERS).fetch_all(&self.pool).await?;

        let mut params = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let value: Option<String> = row.try_get("value")?;
            if let Some(value) = value {
                params.insert(name, value);
            }
        }
        debug!("Loaded {} system parameters", params.len());
        Ok(params)
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn save_readings(&self, readings: &[Reading]) -> std::result::Result<BatchReport, PersistError> {
        let mut report = BatchReport::default();
        if readings.is_empty() {
            return Ok(report);
        }

        let mut tx = self.pool.begin().await?;

        for reading in readings {
            // Each row gets its own savepoint so a rejected row does not
            // abort the surrounding transaction.
            let mut savepoint = Connection::begin(&mut *tx).await?;

            match insert_reading(&mut savepoint, reading).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    report.saved += 1;
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    warn!("Skipping property {}: {}", reading.property_id, e);
                    report.skipped += 1;
                }
            }
        }

        tx.commit().await?;
        debug!("Committed {} readings ({} skipped)", report.saved, report.skipped);
        Ok(report)
    }

    async fn record_log(&self, entry: &ApiLog) -> std::result::Result<(), PersistError> {
        sqlx::query(INSERT_LOG)
            .bind(&entry.log_level)
            .bind(&entry.message)
            .bind(&entry.endpoint)
            .bind(entry.status_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn insert_reading(
    conn: &mut sqlx::PgConnection,
    reading: &Reading,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(INSERT_READING)
        .bind(reading.created_at)
        .bind(&reading.href)
        .bind(&reading.property_id)
        .bind(reading.last_value)
        .bind(reading.linked_to_trigger)
        .bind(&reading.name)
        .bind(&reading.permission)
        .bind(reading.persist)
        .bind(reading.tag)
        .bind(&reading.thing_id)
        .bind(&reading.thing_name)
        .bind(&reading.value_type)
        .bind(reading.update_parameter)
        .bind(&reading.update_strategy)
        .bind(reading.updated_at)
        .bind(reading.value_updated_at)
        .bind(&reading.variable_name)
        .execute(conn)
        .await?;
    Ok(())
}
