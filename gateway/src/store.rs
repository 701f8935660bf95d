use crate::annotated_csv::FluxRecord;
use crate::errors::Result;
use crate::flux::FluxQuery;
use crate::line_protocol::Point;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status string a store reports when it is ready for reads and writes.
pub const HEALTH_PASS: &str = "pass";

/// Body of the store's `/health` endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreHealth {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

impl StoreHealth {
    pub fn is_pass(&self) -> bool {
        self.status == HEALTH_PASS
    }
}

/// The time-series store the gateway writes to and reads from.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn write_point(&self, point: &Point) -> Result<()>;

    async fn query(&self, query: &FluxQuery) -> Result<Vec<FluxRecord>>;

    async fn health(&self) -> Result<StoreHealth>;
}
