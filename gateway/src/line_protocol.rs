//! InfluxDB line protocol encoding.
//!
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp_ns
//! ```

use crate::errors::{Error, Result};
use crate::model::{SensorReading, MEASUREMENT};
use chrono::{DateTime, Utc};

/// One timestamped record, built up the way a client library point is.
#[derive(Debug, Clone)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f64)>,
    timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp,
        }
    }

    /// Adds a tag. Empty values are dropped since line protocol has no way
    /// to express them.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.tags.push((key.into(), value));
        }
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn fields(&self) -> &[(String, f64)] {
        &self.fields
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Encodes the point as a single line. Tags are sorted by key.
    pub fn to_line(&self) -> Result<String> {
        if self.fields.is_empty() {
            return Err(Error::Validation(
                "a point needs at least one field".to_string(),
            ));
        }
        let timestamp_ns = self.timestamp.timestamp_nanos_opt().ok_or_else(|| {
            Error::Validation(format!(
                "timestamp {} is outside the representable nanosecond range",
                self.timestamp
            ))
        })?;

        let mut line = escape_measurement(&self.measurement);

        let mut sorted_tags: Vec<_> = self.tags.iter().collect();
        sorted_tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in sorted_tags {
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&value.to_string());
        }

        line.push(' ');
        line.push_str(&timestamp_ns.to_string());
        Ok(line)
    }
}

impl From<&SensorReading> for Point {
    fn from(reading: &SensorReading) -> Self {
        Point::new(MEASUREMENT, reading.timestamp)
            .tag("sensor_id", reading.id.as_str())
            .tag("location", reading.location.as_str())
            .field("temperature", reading.temperature)
            .field("humidity", reading.humidity)
            .field("pressure", reading.pressure)
            .field("altitude", reading.altitude)
    }
}

/// Measurement names escape commas and spaces.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Tag keys, tag values and field keys escape commas, equals signs and spaces.
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1, 0).unwrap()
    }

    #[test]
    fn test_tags_sorted_by_key() {
        let line = Point::new("temperature", ts())
            .tag("sensor", "A1")
            .tag("location", "room1")
            .field("value", 23.5)
            .to_line()
            .unwrap();

        assert_eq!(
            line,
            "temperature,location=room1,sensor=A1 value=23.5 1000000000"
        );
    }

    #[test]
    fn test_empty_tag_is_dropped() {
        let point = Point::new("m", ts())
            .tag("location", "")
            .field("f", 1.0);

        assert!(point.tags().is_empty());
        assert_eq!(point.to_line().unwrap(), "m f=1 1000000000");
    }

    #[test]
    fn test_escape_special_chars() {
        let line = Point::new("my measurement", Utc.timestamp_opt(3, 0).unwrap())
            .tag("tag key", "tag,value=x")
            .field("field=key", 0.25)
            .to_line()
            .unwrap();

        assert_eq!(
            line,
            "my\\ measurement,tag\\ key=tag\\,value\\=x field\\=key=0.25 3000000000"
        );
    }

    #[test]
    fn test_point_without_fields_is_rejected() {
        assert!(Point::new("m", ts()).to_line().is_err());
    }

    #[test]
    fn test_reading_point() {
        let reading = SensorReading {
            id: "sensor 7".to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 5).unwrap(),
            temperature: 21.5,
            humidity: 40.0,
            pressure: 1013.2,
            altitude: -3.5,
            location: "lab".to_string(),
        };

        let line = Point::from(&reading).to_line().unwrap();
        assert_eq!(
            line,
            "sensor_readings,location=lab,sensor_id=sensor\\ 7 \
             temperature=21.5,humidity=40,pressure=1013.2,altitude=-3.5 1700000000000000005"
        );
    }
}
