use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version stamped on every persisted batch.
pub const SCHEMA_VERSION: &str = "1.0";

/// A reading exactly as the source returned it: an untrusted JSON object.
///
/// Nothing about its shape is known until the validator has looked at it.
pub type RawReading = serde_json::Map<String, serde_json::Value>;

/// Numeric measurement fields a reading can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Temperature,
    Humidity,
    Pressure,
    Vibration,
    Voltage,
}

impl Measurement {
    pub const ALL: [Measurement; 5] = [
        Measurement::Temperature,
        Measurement::Humidity,
        Measurement::Pressure,
        Measurement::Vibration,
        Measurement::Voltage,
    ];

    /// Field name as it appears on the wire.
    pub fn field_name(self) -> &'static str {
        match self {
            Measurement::Temperature => "temperature",
            Measurement::Humidity => "humidity",
            Measurement::Pressure => "pressure",
            Measurement::Vibration => "vibration",
            Measurement::Voltage => "voltage",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// A validated sensor observation.
///
/// Only the validator builds these, so every `Reading` in the system has a
/// non-blank `sensor_id`, a parsed timestamp and a numeric temperature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    /// Observation instant, normalized to UTC.
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
}

impl Reading {
    /// Minimal reading with only the required fields set.
    pub fn new(sensor_id: impl Into<String>, timestamp: DateTime<Utc>, temperature: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            temperature,
            humidity: None,
            pressure: None,
            vibration: None,
            voltage: None,
        }
    }

    pub fn measurement(&self, m: Measurement) -> Option<f64> {
        match m {
            Measurement::Temperature => Some(self.temperature),
            Measurement::Humidity => self.humidity,
            Measurement::Pressure => self.pressure,
            Measurement::Vibration => self.vibration,
            Measurement::Voltage => self.voltage,
        }
    }
}

/// Outcome of the anomaly model for one valid reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub reading: Reading,
    pub is_anomaly: bool,
    /// Model-specific score; higher means more unusual.
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The clean readings of one cycle, persisted together as one object.
///
/// Fields are private: a batch is fixed at construction and is never merged
/// with or split into other batches.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    readings: Vec<Reading>,
    generated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(readings: Vec<Reading>, generated_at: DateTime<Utc>) -> Self {
        Self {
            readings,
            generated_at,
        }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn record_count(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn schema_version(&self) -> &'static str {
        SCHEMA_VERSION
    }
}
