use serde::{Deserialize, Serialize};

use crate::domain::SensorReading;
use crate::validators::{validate_coordinates, validate_epoch_millis, ValidationError};

pub const TEMP_MIN_C: f64 = -40.0;
pub const TEMP_MAX_C: f64 = 85.0;
pub const HUMIDITY_MIN_PCT: f64 = 0.0;
pub const HUMIDITY_MAX_PCT: f64 = 100.0;
pub const SOIL_MOISTURE_MIN_PCT: f64 = 0.0;
pub const SOIL_MOISTURE_MAX_PCT: f64 = 100.0;

/// Sensor status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Ok,
    Missing,
    OutOfRange,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Ok => "ok",
            SensorStatus::Missing => "missing",
            SensorStatus::OutOfRange => "out_of_range",
        }
    }
}

pub fn validate_temperature(temp_c: Option<f64>) -> SensorStatus {
    match temp_c {
        None => SensorStatus::Missing,
        Some(t) if !(TEMP_MIN_C..=TEMP_MAX_C).contains(&t) => SensorStatus::OutOfRange,
        Some(_) => SensorStatus::Ok,
    }
}

pub fn validate_humidity(humidity_pct: Option<f64>) -> SensorStatus {
    match humidity_pct {
        None => SensorStatus::Missing,
        Some(h) if !(HUMIDITY_MIN_PCT..=HUMIDITY_MAX_PCT).contains(&h) => SensorStatus::OutOfRange,
        Some(_) => SensorStatus::Ok,
    }
}

pub fn validate_soil_moisture(soil_moisture_pct: Option<f64>) -> SensorStatus {
    match soil_moisture_pct {
        None => SensorStatus::Missing,
        Some(m) if !(SOIL_MOISTURE_MIN_PCT..=SOIL_MOISTURE_MAX_PCT).contains(&m) => {
            SensorStatus::OutOfRange
        }
        Some(_) => SensorStatus::Ok,
    }
}

/// A live snapshot that passed validation and can be archived
#[derive(Debug, Clone, PartialEq)]
pub struct ValidReading {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: Option<i64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Check a live snapshot before it enters the pipeline
///
/// Temperature and humidity are required and range-checked. A timestamp, when
/// present, must be plausible epoch milliseconds. Coordinates are dropped
/// (not rejected) when out of range so the default location is used instead.
pub fn validate_reading(reading: &SensorReading) -> Result<ValidReading, ValidationError> {
    let temperature = match (validate_temperature(reading.temp), reading.temp) {
        (SensorStatus::Ok, Some(t)) => t,
        (status, _) => {
            return Err(ValidationError::new(
                "temp",
                format!("Temperature is {}", status.as_str()),
            ))
        }
    };

    let humidity = match (validate_humidity(reading.hum), reading.hum) {
        (SensorStatus::Ok, Some(h)) => h,
        (status, _) => {
            return Err(ValidationError::new(
                "hum",
                format!("Humidity is {}", status.as_str()),
            ))
        }
    };

    if let Some(ts) = reading.timestamp {
        validate_epoch_millis(ts)?;
    }

    let (lat, lon) = match reading.coordinates() {
        Some(c) if validate_coordinates(c.latitude, c.longitude).is_ok() => {
            (Some(c.latitude), Some(c.longitude))
        }
        _ => (None, None),
    };

    Ok(ValidReading {
        temperature,
        humidity,
        timestamp: reading.timestamp,
        lat,
        lon,
    })
}
