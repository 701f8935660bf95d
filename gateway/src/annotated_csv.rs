//! Decoding of InfluxDB annotated CSV query results.
//!
//! A response is a sequence of tables. Each table starts with annotation rows
//! (`#datatype`, `#group`, `#default`), followed by a header row and the data
//! rows. Column 0 is reserved for annotations and is empty on every other row.
//! Tables are separated by blank lines.

use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum FluxValue {
    Null,
    String(String),
    Double(f64),
    Long(i64),
    UnsignedLong(u64),
    Boolean(bool),
    Time(DateTime<Utc>),
}

/// One data row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FluxRecord {
    values: HashMap<String, FluxValue>,
}

impl FluxRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: FluxValue) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&FluxValue> {
        self.values.get(column)
    }

    /// String column; a missing or null cell is `Ok(None)`.
    pub fn string(&self, column: &str) -> Result<Option<&str>> {
        match self.get(column) {
            None | Some(FluxValue::Null) => Ok(None),
            Some(FluxValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(type_mismatch(column, "string", other)),
        }
    }

    /// Numeric column widened to `f64`; a missing or null cell is `Ok(None)`.
    pub fn float(&self, column: &str) -> Result<Option<f64>> {
        match self.get(column) {
            None | Some(FluxValue::Null) => Ok(None),
            Some(FluxValue::Double(v)) => Ok(Some(*v)),
            Some(FluxValue::Long(v)) => Ok(Some(*v as f64)),
            Some(FluxValue::UnsignedLong(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(type_mismatch(column, "double", other)),
        }
    }

    pub fn time(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        match self.get(column) {
            None | Some(FluxValue::Null) => Ok(None),
            Some(FluxValue::Time(t)) => Ok(Some(*t)),
            Some(other) => Err(type_mismatch(column, "dateTime", other)),
        }
    }
}

fn type_mismatch(column: &str, expected: &str, found: &FluxValue) -> Error {
    Error::Schema(format!(
        "column '{}' expected {}, found {:?}",
        column, expected, found
    ))
}

/// Parses a full annotated CSV body into records.
///
/// An in-band error table (header `,error,reference`) turns into
/// [`Error::Query`].
pub fn parse(body: &str) -> Result<Vec<FluxRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut records = Vec::new();
    let mut datatypes: Vec<String> = Vec::new();
    let mut header: Option<Vec<String>> = None;

    for row in reader.records() {
        let row = row?;
        if row.iter().all(str::is_empty) {
            // Blank separator between tables.
            header = None;
            continue;
        }

        let first = row.get(0).unwrap_or("");
        if first.starts_with('#') {
            if first == "#datatype" {
                datatypes = row.iter().map(str::to_string).collect();
            }
            header = None;
            continue;
        }

        let columns = match &header {
            Some(columns) => columns,
            None => {
                header = Some(row.iter().map(str::to_string).collect());
                continue;
            }
        };

        if columns.get(1).map(String::as_str) == Some("error") {
            let message = row.get(1).unwrap_or("unknown query error");
            return Err(Error::Query(message.to_string()));
        }

        let mut record = FluxRecord::new();
        for (idx, (name, cell)) in columns.iter().zip(row.iter()).enumerate().skip(1) {
            let datatype = datatypes.get(idx).map(String::as_str).unwrap_or("string");
            record.values.insert(name.clone(), parse_cell(name, datatype, cell)?);
        }
        records.push(record);
    }

    Ok(records)
}

fn parse_cell(column: &str, datatype: &str, cell: &str) -> Result<FluxValue> {
    if cell.is_empty() && datatype != "string" {
        return Ok(FluxValue::Null);
    }

    let invalid = |e: &dyn std::fmt::Display| {
        Error::Schema(format!(
            "column '{}' has invalid {} value '{}': {}",
            column, datatype, cell, e
        ))
    };

    let value = match datatype {
        "double" => FluxValue::Double(parse_double(cell).map_err(|e| invalid(&e))?),
        "long" => FluxValue::Long(cell.parse().map_err(|e| invalid(&e))?),
        "unsignedLong" => FluxValue::UnsignedLong(cell.parse().map_err(|e| invalid(&e))?),
        "boolean" => FluxValue::Boolean(cell.parse().map_err(|e| invalid(&e))?),
        dt if dt.starts_with("dateTime") => FluxValue::Time(
            DateTime::parse_from_rfc3339(cell)
                .map_err(|e| invalid(&e))?
                .with_timezone(&Utc),
        ),
        _ => FluxValue::String(cell.to_string()),
    };
    Ok(value)
}

fn parse_double(cell: &str) -> std::result::Result<f64, std::num::ParseFloatError> {
    match cell {
        "+Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => cell.parse(),
    }
}
