//! HTTP gateway that stores sensor readings in InfluxDB v2 and reads them back.

pub mod annotated_csv;
pub mod config;
pub mod errors;
pub mod flux;
pub mod gateway;
pub mod influx;
pub mod line_protocol;
pub mod metrics;
pub mod model;
pub mod rest;
pub mod store;
pub mod validate;

pub use config::{Config, StoreTimeouts};
pub use gateway::{GatewayError, ListParams, SensorGateway};
pub use model::{ApiResponse, NewReading, SensorReading};
pub use store::{StoreHealth, TimeSeriesStore};
