use crate::errors::{Error, Result};
use crate::model::SensorReading;

/// Validates a reading before it is turned into a point
pub fn validate(reading: &SensorReading) -> Result<()> {
    let measurements = [
        ("Temperature", reading.temperature),
        ("Humidity", reading.humidity),
        ("Pressure", reading.pressure),
        ("Altitude", reading.altitude),
    ];
    for (name, value) in measurements {
        if !value.is_finite() {
            return Err(Error::Validation(format!("{} must be a finite number", name)));
        }
    }

    if reading.timestamp.timestamp_nanos_opt().is_none() {
        return Err(Error::Validation(format!(
            "Timestamp {} is outside the supported range",
            reading.timestamp
        )));
    }

    if reading.id.is_empty() {
        return Err(Error::Validation("Sensor ID cannot be empty".to_string()));
    }
    if reading.id.chars().any(char::is_control) {
        return Err(Error::Validation(
            "Sensor ID cannot contain control characters".to_string(),
        ));
    }

    if reading.location.chars().any(char::is_control) {
        return Err(Error::Validation(
            "Location cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}
