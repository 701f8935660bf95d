#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use sensor_gateway::annotated_csv::{FluxRecord, FluxValue};
use sensor_gateway::errors::{Error, Result};
use sensor_gateway::flux::FluxQuery;
use sensor_gateway::line_protocol::Point;
use sensor_gateway::{rest, SensorGateway, StoreHealth, StoreTimeouts, TimeSeriesStore};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const BUCKET: &str = "sensor_data";

/// In-memory store that understands just enough of the generated Flux
/// (equality filters, newest-first order, limit) to answer it.
#[derive(Default)]
pub struct MemoryStore {
    points: Mutex<Vec<Point>>,
    queries: Mutex<Vec<String>>,
    health_status: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    fail_writes: AtomicBool,
    fail_queries: AtomicBool,
    corrupt_rows: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let store = Self::default();
        store.set_health("pass");
        Arc::new(store)
    }

    pub fn set_health(&self, status: &str) {
        *self.health_status.lock().unwrap() = Some(status.to_string());
    }

    pub fn set_unreachable(&self) {
        *self.health_status.lock().unwrap() = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    /// Makes every returned row carry a non-numeric temperature.
    pub fn corrupt_rows(&self) {
        self.corrupt_rows.store(true, Ordering::SeqCst);
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> Option<String> {
        self.queries.lock().unwrap().last().cloned()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn evaluate(&self, flux: &str) -> Vec<FluxRecord> {
        let filters = parse_filters(flux);
        let limit = parse_limit(flux).unwrap_or(usize::MAX);

        let mut points: Vec<Point> = self
            .points()
            .into_iter()
            .filter(|p| {
                filters.iter().all(|(column, value)| match column.as_str() {
                    "_measurement" => p.measurement() == value,
                    tag => tag_value(p, tag) == Some(value.as_str()),
                })
            })
            .collect();
        points.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        points.truncate(limit);

        let corrupt = self.corrupt_rows.load(Ordering::SeqCst);
        points
            .iter()
            .map(|p| {
                let record = to_record(p);
                if corrupt {
                    record.with("temperature", FluxValue::Boolean(true))
                } else {
                    record
                }
            })
            .collect()
    }
}

#[async_trait]
impl TimeSeriesStore for MemoryStore {
    async fn write_point(&self, point: &Point) -> Result<()> {
        self.pause().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Status {
                status: 503,
                message: "write refused".to_string(),
            });
        }
        // Exercise the real encoder so unencodable points fail here too.
        point.to_line()?;
        self.points.lock().unwrap().push(point.clone());
        Ok(())
    }

    async fn query(&self, query: &FluxQuery) -> Result<Vec<FluxRecord>> {
        self.pause().await;
        let flux = query.build();
        self.queries.lock().unwrap().push(flux.clone());
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::Query("engine exploded".to_string()));
        }
        Ok(self.evaluate(&flux))
    }

    async fn health(&self) -> Result<StoreHealth> {
        self.pause().await;
        match self.health_status.lock().unwrap().clone() {
            Some(status) => Ok(StoreHealth {
                name: "memory".to_string(),
                status,
                ..Default::default()
            }),
            None => Err(Error::Status {
                status: 502,
                message: "connection refused".to_string(),
            }),
        }
    }
}

fn tag_value<'a>(point: &'a Point, key: &str) -> Option<&'a str> {
    point
        .tags()
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn to_record(point: &Point) -> FluxRecord {
    let mut record = FluxRecord::new()
        .with("_time", FluxValue::Time(point.timestamp()))
        .with(
            "_measurement",
            FluxValue::String(point.measurement().to_string()),
        );
    for (key, value) in point.tags() {
        record = record.with(key.clone(), FluxValue::String(value.clone()));
    }
    for (key, value) in point.fields() {
        record = record.with(key.clone(), FluxValue::Double(*value));
    }
    record
}

/// Pulls `(column, value)` out of every `filter(fn: (r) => r["col"] == "value")`.
pub fn parse_filters(flux: &str) -> Vec<(String, String)> {
    flux.lines()
        .filter_map(|line| {
            let rest = line.split_once("r[\"")?.1;
            let (column, rest) = rest.split_once("\"] == \"")?;
            let value = rest.strip_suffix("\")")?;
            Some((column.to_string(), unescape(value)))
        })
        .collect()
}

fn parse_limit(flux: &str) -> Option<usize> {
    let rest = flux.split_once("limit(n: ")?.1;
    rest.split(')').next()?.parse().ok()
}

fn unescape(literal: &str) -> String {
    let mut out = String::new();
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn gateway(store: Arc<MemoryStore>) -> SensorGateway {
    gateway_with_timeouts(store, StoreTimeouts::default())
}

pub fn gateway_with_timeouts(store: Arc<MemoryStore>, timeouts: StoreTimeouts) -> SensorGateway {
    SensorGateway::new(store, BUCKET, timeouts)
}

pub fn app(store: Arc<MemoryStore>) -> Router {
    rest::create_router(gateway(store))
}

pub async fn send_raw(app: &Router, method: &str, uri: &str, body: Option<String>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("Content-Type", "application/json");
    }
    let request = builder
        .body(body.map(Body::from).unwrap_or_else(Body::empty))
        .unwrap();

    app.clone().oneshot(request).await.unwrap()
}

/// Sends a request and decodes the JSON envelope of the response.
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = send_raw(app, method, uri, body.map(|b| b.to_string())).await;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
