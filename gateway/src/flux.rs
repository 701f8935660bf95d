//! Flux query construction.
//!
//! Caller-supplied values only ever reach a query through [`string_literal`],
//! which escapes everything that could terminate the literal or open an
//! interpolation.

use crate::model::MEASUREMENT;
use std::fmt;

/// Relative start of a `range()` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    Hours(u32),
    Days(u32),
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookback::Hours(h) => write!(f, "-{}h", h),
            Lookback::Days(d) => write!(f, "-{}d", d),
        }
    }
}

/// Window scanned when listing readings.
pub const LIST_LOOKBACK: Lookback = Lookback::Hours(24);
/// Window scanned when fetching a reading by id.
pub const BY_ID_LOOKBACK: Lookback = Lookback::Days(30);

/// A pipeline of Flux stages starting at `from(bucket:)`.
#[derive(Debug, Clone)]
pub struct FluxQuery {
    stages: Vec<String>,
}

impl FluxQuery {
    pub fn from_bucket(bucket: &str) -> Self {
        Self {
            stages: vec![format!("from(bucket: {})", string_literal(bucket))],
        }
    }

    pub fn range(mut self, start: Lookback) -> Self {
        self.stages.push(format!("range(start: {})", start));
        self
    }

    /// Keeps rows whose `column` equals `value`.
    pub fn filter_eq(mut self, column: &str, value: &str) -> Self {
        self.stages.push(format!(
            "filter(fn: (r) => r[{}] == {})",
            string_literal(column),
            string_literal(value)
        ));
        self
    }

    /// Turns one-row-per-field into one row per timestamp.
    pub fn pivot_fields(mut self) -> Self {
        self.stages.push(
            r#"pivot(rowKey: ["_time"], columnKey: ["_field"], valueColumn: "_value")"#.to_string(),
        );
        self
    }

    /// Merges every series into a single table.
    pub fn ungroup(mut self) -> Self {
        self.stages.push("group()".to_string());
        self
    }

    pub fn sort_newest_first(mut self) -> Self {
        self.stages
            .push(r#"sort(columns: ["_time"], desc: true)"#.to_string());
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.stages.push(format!("limit(n: {})", n));
        self
    }

    pub fn build(&self) -> String {
        self.stages.join("\n  |> ")
    }
}

impl fmt::Display for FluxQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// Newest `limit` readings of the last day, optionally for one location.
pub fn list_readings(bucket: &str, location: Option<&str>, limit: usize) -> FluxQuery {
    let mut query = FluxQuery::from_bucket(bucket)
        .range(LIST_LOOKBACK)
        .filter_eq("_measurement", MEASUREMENT);

    if let Some(location) = location {
        query = query.filter_eq("location", location);
    }

    query
        .pivot_fields()
        .ungroup()
        .sort_newest_first()
        .limit(limit)
}

/// The single most recent reading stored under `id`.
pub fn latest_reading(bucket: &str, id: &str) -> FluxQuery {
    FluxQuery::from_bucket(bucket)
        .range(BY_ID_LOOKBACK)
        .filter_eq("_measurement", MEASUREMENT)
        .filter_eq("sensor_id", id)
        .pivot_fields()
        .ungroup()
        .sort_newest_first()
        .limit(1)
}

/// Encodes `value` as a double-quoted Flux string literal.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
