use crate::annotated_csv::FluxRecord;
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Measurement every reading is written under.
pub const MEASUREMENT: &str = "sensor_readings";

/// Unix seconds of `0001-01-01T00:00:00Z`, the instant clients send for an
/// unset time.
const ZERO_TIME_SECS: i64 = -62_135_596_800;

/// A stored sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub altitude: f64,
    pub location: String,
}

/// Request body for create and update. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewReading {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub temperature: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub humidity: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pressure: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub altitude: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
}

impl NewReading {
    /// Resolves the missing timestamp to `now` and the missing id to one
    /// derived from the timestamp. The zero instant counts as missing.
    pub fn into_reading(self, now: DateTime<Utc>) -> SensorReading {
        let timestamp = self
            .timestamp
            .filter(|t| !is_zero_time(t))
            .unwrap_or(now);
        let id = match self.id {
            Some(id) if !id.is_empty() => id,
            _ => generate_id(&timestamp),
        };

        SensorReading {
            id,
            timestamp,
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            altitude: self.altitude,
            location: self.location,
        }
    }
}

impl TryFrom<&FluxRecord> for SensorReading {
    type Error = Error;

    /// Decodes one pivoted row. Missing measurements read as `0.0` and a
    /// missing location as the empty string.
    fn try_from(record: &FluxRecord) -> Result<Self> {
        let id = record
            .string("sensor_id")?
            .ok_or_else(|| Error::Schema("row has no sensor_id".to_string()))?;
        let timestamp = record
            .time("_time")?
            .ok_or_else(|| Error::Schema("row has no _time".to_string()))?;

        Ok(SensorReading {
            id: id.to_string(),
            timestamp,
            temperature: record.float("temperature")?.unwrap_or_default(),
            humidity: record.float("humidity")?.unwrap_or_default(),
            pressure: record.float("pressure")?.unwrap_or_default(),
            altitude: record.float("altitude")?.unwrap_or_default(),
            location: record.string("location")?.unwrap_or_default().to_string(),
        })
    }
}

/// Treats an explicit `null` like an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn is_zero_time(timestamp: &DateTime<Utc>) -> bool {
    timestamp.timestamp() == ZERO_TIME_SECS && timestamp.timestamp_subsec_nanos() == 0
}

pub fn generate_id(timestamp: &DateTime<Utc>) -> String {
    format!("sensor_{}", timestamp.timestamp())
}

/// Envelope wrapping every JSON response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

/// Payload of a successful health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub database: String,
}
