//! Translation of sensor-reading CRUD onto an append-only time-series store.
//!
//! Create and update both append a point; the newest point under an id is
//! what reads return. Deletion has no equivalent and is always refused.

use crate::config::StoreTimeouts;
use crate::errors::{Error, Result};
use crate::flux;
use crate::line_protocol::Point;
use crate::metrics::{
    READINGS_WRITTEN_TOTAL, STORE_FAILURES_TOTAL, STORE_LATENCY_SECONDS, STORE_REQUESTS_TOTAL,
};
use crate::model::{HealthReport, NewReading, SensorReading};
use crate::store::{StoreHealth, TimeSeriesStore};
use crate::validate::validate;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_LIST_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Sensor data not found")]
    NotFound,

    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        source: Error,
    },

    #[error("Delete operation not implemented for time series data")]
    NotImplemented,

    #[error("Database connection failed: {0}")]
    Unavailable(String),
}

/// Query string of the list endpoint. Both keys are kept as raw strings so
/// that a malformed `limit` falls back to the default instead of failing.
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub limit: Option<String>,
    pub location: Option<String>,
}

impl ListParams {
    /// Picks the keys out of decoded query pairs. The first occurrence of a
    /// repeated key wins and unknown keys are ignored.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let first = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        Self {
            limit: first("limit"),
            location: first("location"),
        }
    }

    pub fn effective_limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|l| l.parse::<usize>().ok())
            .filter(|&l| l > 0)
            .unwrap_or(DEFAULT_LIST_LIMIT)
    }

    pub fn location_filter(&self) -> Option<&str> {
        self.location.as_deref().filter(|l| !l.is_empty())
    }
}

#[derive(Clone)]
pub struct SensorGateway {
    store: Arc<dyn TimeSeriesStore>,
    bucket: String,
    timeouts: StoreTimeouts,
}

impl SensorGateway {
    pub fn new(
        store: Arc<dyn TimeSeriesStore>,
        bucket: impl Into<String>,
        timeouts: StoreTimeouts,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            timeouts,
        }
    }

    /// Decodes a new reading, fills in id and timestamp, and writes it.
    pub async fn create(&self, body: &[u8]) -> std::result::Result<SensorReading, GatewayError> {
        let reading = decode_body(body)?.into_reading(Utc::now());
        self.write(reading, "Failed to write to database").await
    }

    /// Appends a point under `id` regardless of what is already stored.
    pub async fn update(
        &self,
        id: &str,
        body: &[u8],
    ) -> std::result::Result<SensorReading, GatewayError> {
        let mut input = decode_body(body)?;
        input.id = Some(id.to_string());
        let reading = input.into_reading(Utc::now());
        self.write(reading, "Failed to update data").await
    }

    pub async fn list(
        &self,
        params: &ListParams,
    ) -> std::result::Result<Vec<SensorReading>, GatewayError> {
        let query = flux::list_readings(
            &self.bucket,
            params.location_filter(),
            params.effective_limit(),
        );

        let records = self
            .call("list", self.timeouts.list, self.store.query(&query))
            .await
            .map_err(query_failure)?;
        debug!("List query returned {} rows", records.len());

        records
            .iter()
            .map(SensorReading::try_from)
            .collect::<Result<Vec<_>>>()
            .map_err(query_failure)
    }

    pub async fn get(&self, id: &str) -> std::result::Result<SensorReading, GatewayError> {
        let query = flux::latest_reading(&self.bucket, id);

        let records = self
            .call("get", self.timeouts.get, self.store.query(&query))
            .await
            .map_err(query_failure)?;

        let record = records.first().ok_or(GatewayError::NotFound)?;
        SensorReading::try_from(record).map_err(query_failure)
    }

    /// There is nothing to delete in an append-only store, so this only
    /// ever produces the refusal.
    pub fn delete(&self, id: &str) -> GatewayError {
        debug!(sensor_id = %id, "Refusing delete on append-only store");
        GatewayError::NotImplemented
    }

    /// Healthy only when the store itself reports `pass`.
    pub async fn health(&self) -> std::result::Result<HealthReport, GatewayError> {
        match self.ping(self.timeouts.health).await {
            Ok(health) if health.is_pass() => Ok(HealthReport {
                status: "healthy".to_string(),
                timestamp: Utc::now(),
                database: "connected".to_string(),
            }),
            Ok(health) => Err(GatewayError::Unavailable(format!(
                "store reported status '{}'",
                health.status
            ))),
            Err(e) => Err(GatewayError::Unavailable(e.to_string())),
        }
    }

    /// Raw store health, used at startup.
    pub async fn ping(&self, timeout: Duration) -> Result<StoreHealth> {
        self.call("health", timeout, self.store.health()).await
    }

    async fn write(
        &self,
        reading: SensorReading,
        context: &'static str,
    ) -> std::result::Result<SensorReading, GatewayError> {
        validate(&reading).map_err(|e| {
            warn!(sensor_id = %reading.id, "Rejected reading: {}", e);
            GatewayError::BadRequest(e.to_string())
        })?;

        let point = Point::from(&reading);
        self.call("write", self.timeouts.write, self.store.write_point(&point))
            .await
            .map_err(|source| GatewayError::Storage { context, source })?;

        READINGS_WRITTEN_TOTAL.inc();
        info!(sensor_id = %reading.id, location = %reading.location, "Reading written");
        Ok(reading)
    }

    /// Runs one store call under a timeout, recording latency and failures.
    async fn call<T, F>(&self, operation: &'static str, timeout: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        STORE_REQUESTS_TOTAL.with_label_values(&[operation]).inc();
        let timer = STORE_LATENCY_SECONDS
            .with_label_values(&[operation])
            .start_timer();

        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { operation, timeout }),
        };
        timer.observe_duration();

        if result.is_err() {
            STORE_FAILURES_TOTAL.with_label_values(&[operation]).inc();
        }
        result
    }
}

fn decode_body(body: &[u8]) -> std::result::Result<NewReading, GatewayError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Invalid JSON body: {}", e);
        GatewayError::BadRequest("Invalid JSON format".to_string())
    })
}

fn query_failure(source: Error) -> GatewayError {
    let context = if source.is_decode_error() {
        "Error processing query results"
    } else {
        "Failed to query database"
    };
    GatewayError::Storage { context, source }
}
