//! Schema and quality checks for raw sensor records.
//!
//! The validator never fails as a whole: every record ends up either as a
//! typed [`Reading`] or as a [`ValidationVerdict`] listing everything that
//! is wrong with it. Checks are not short-circuited, so one record can carry
//! several reasons.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use iotpipe_core::{Measurement, RawReading, Reading};

/// Fields that must be present and non-null.
pub const REQUIRED_FIELDS: [&str; 3] = ["sensor_id", "timestamp", "temperature"];

/// Declared kind of every known field. Fields not listed here are ignored.
pub const FIELD_SCHEMA: [(&str, FieldKind); 7] = [
    ("sensor_id", FieldKind::String),
    ("timestamp", FieldKind::String),
    ("temperature", FieldKind::Number),
    ("humidity", FieldKind::Number),
    ("pressure", FieldKind::Number),
    ("vibration", FieldKind::Number),
    ("voltage", FieldKind::Number),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
}

impl FieldKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Number => value.is_number(),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::String => f.write_str("string"),
            FieldKind::Number => f.write_str("number"),
        }
    }
}

/// JSON kind name used in type-mismatch messages.
fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single per-field problem with a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Missing required field: '{0}'")]
    MissingField(&'static str),

    #[error("Invalid type for '{field}': expected {expected}, got {actual}")]
    WrongType {
        field: &'static str,
        expected: FieldKind,
        actual: &'static str,
    },

    #[error("Invalid timestamp format: '{0}'")]
    BadTimestamp(String),

    #[error("sensor_id cannot be empty")]
    BlankSensorId,
}

/// A rejected record together with every reason it was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationVerdict {
    pub record: RawReading,
    /// Never empty.
    pub errors: Vec<SchemaError>,
}

impl ValidationVerdict {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// Result of validating one fetched set of records. Input order is kept
/// within both lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validation {
    pub valid: Vec<Reading>,
    pub invalid: Vec<ValidationVerdict>,
}

/// Stateless record validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Split `records` into typed readings and rejected records.
    pub fn validate(&self, records: Vec<RawReading>) -> Validation {
        let total = records.len();
        let mut out = Validation::default();

        for record in records {
            match self.validate_record(&record) {
                Ok(reading) => out.valid.push(reading),
                Err(errors) => {
                    let sensor_id = record
                        .get("sensor_id")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unknown");
                    debug!(
                        sensor_id,
                        errors = ?errors,
                        "invalid record"
                    );
                    out.invalid.push(ValidationVerdict { record, errors });
                }
            }
        }

        info!(
            total,
            valid = out.valid.len(),
            invalid = out.invalid.len(),
            "validation complete"
        );
        out
    }

    /// Check one record, returning the typed reading or all of its errors.
    pub fn validate_record(&self, record: &RawReading) -> Result<Reading, Vec<SchemaError>> {
        let mut errors = Vec::new();

        for field in REQUIRED_FIELDS {
            if present(record, field).is_none() {
                errors.push(SchemaError::MissingField(field));
            }
        }

        for (field, kind) in FIELD_SCHEMA {
            if let Some(value) = present(record, field) {
                if !kind.matches(value) {
                    errors.push(SchemaError::WrongType {
                        field,
                        expected: kind,
                        actual: json_kind(value),
                    });
                }
            }
        }

        let timestamp = match present(record, "timestamp") {
            Some(Value::String(raw)) => match parse_timestamp(raw) {
                Some(ts) => Some(ts),
                None => {
                    errors.push(SchemaError::BadTimestamp(raw.clone()));
                    None
                }
            },
            Some(other) => {
                errors.push(SchemaError::BadTimestamp(other.to_string()));
                None
            }
            None => None,
        };

        let sensor_id = match present(record, "sensor_id") {
            Some(Value::String(id)) if id.trim().is_empty() => {
                errors.push(SchemaError::BlankSensorId);
                None
            }
            Some(Value::String(id)) => Some(id.clone()),
            _ => None,
        };

        let number = |m: Measurement| present(record, m.field_name()).and_then(Value::as_f64);

        match (sensor_id, timestamp, number(Measurement::Temperature)) {
            (Some(sensor_id), Some(timestamp), Some(temperature)) if errors.is_empty() => Ok(Reading {
                sensor_id,
                timestamp,
                temperature,
                humidity: number(Measurement::Humidity),
                pressure: number(Measurement::Pressure),
                vibration: number(Measurement::Vibration),
                voltage: number(Measurement::Voltage),
            }),
            _ => Err(errors),
        }
    }
}

/// Field value, treating JSON `null` the same as absence.
fn present<'a>(record: &'a RawReading, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|v| !v.is_null())
}

/// Parse an ISO-8601 instant. A trailing `Z` means UTC; a timestamp with no
/// offset at all is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> RawReading {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn good() -> RawReading {
        record(json!({
            "sensor_id": "s1",
            "timestamp": "2024-01-01T00:00:00Z",
            "temperature": 21.5,
        }))
    }

    fn errors_of(value: Value) -> Vec<String> {
        Validator::new()
            .validate_record(&record(value))
            .expect_err("record should be invalid")
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn valid_record_becomes_typed_reading() {
        let reading = Validator::new().validate_record(&good()).unwrap();
        assert_eq!(reading.sensor_id, "s1");
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(reading.temperature, 21.5);
        assert_eq!(reading.humidity, None);
    }

    #[test]
    fn optional_measurements_are_carried() {
        let mut rec = good();
        rec.insert("humidity".into(), json!(55));
        rec.insert("voltage".into(), json!(3.3));
        let reading = Validator::new().validate_record(&rec).unwrap();
        assert_eq!(reading.humidity, Some(55.0));
        assert_eq!(reading.voltage, Some(3.3));
    }

    #[test]
    fn each_missing_required_field_is_named() {
        for field in REQUIRED_FIELDS {
            let mut rec = good();
            rec.remove(field);
            let errs = Validator::new().validate_record(&rec).unwrap_err();
            assert_eq!(errs, vec![SchemaError::MissingField(field)]);
            assert!(errs[0].to_string().contains(field));
        }
    }

    #[test]
    fn null_counts_as_missing() {
        let errs = errors_of(json!({
            "sensor_id": null,
            "timestamp": "2024-01-01T00:00:00Z",
            "temperature": 1.0,
        }));
        assert_eq!(errs, vec!["Missing required field: 'sensor_id'"]);
    }

    #[test]
    fn string_temperature_is_a_type_error() {
        let errs = errors_of(json!({
            "sensor_id": "s1",
            "timestamp": "2024-01-01T00:00:00Z",
            "temperature": "hot",
        }));
        assert_eq!(errs, vec!["Invalid type for 'temperature': expected number, got string"]);
    }

    #[test]
    fn boolean_is_not_numeric() {
        let mut rec = good();
        rec.insert("pressure".into(), json!(true));
        let errs = Validator::new().validate_record(&rec).unwrap_err();
        assert_eq!(
            errs,
            vec![SchemaError::WrongType {
                field: "pressure",
                expected: FieldKind::Number,
                actual: "boolean",
            }]
        );
    }

    #[test]
    fn errors_accumulate_in_rule_order() {
        let errs = errors_of(json!({
            "sensor_id": "   ",
            "timestamp": "yesterday",
            "humidity": "wet",
        }));
        assert_eq!(
            errs,
            vec![
                "Missing required field: 'temperature'",
                "Invalid type for 'humidity': expected number, got string",
                "Invalid timestamp format: 'yesterday'",
                "sensor_id cannot be empty",
            ]
        );
    }

    #[test]
    fn numeric_timestamp_fails_type_and_format() {
        let errs = errors_of(json!({
            "sensor_id": "s1",
            "timestamp": 1704067200,
            "temperature": 1.0,
        }));
        assert_eq!(
            errs,
            vec![
                "Invalid type for 'timestamp': expected string, got number",
                "Invalid timestamp format: '1704067200'",
            ]
        );
    }

    #[test]
    fn empty_timestamp_is_a_format_error() {
        let errs = errors_of(json!({"sensor_id": "s1", "timestamp": "", "temperature": 1.0}));
        assert_eq!(errs, vec!["Invalid timestamp format: ''"]);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut rec = good();
        rec.insert("firmware".into(), json!({"rev": 7}));
        assert!(Validator::new().validate_record(&rec).is_ok());
    }

    #[test]
    fn timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T05:30:00+05:30"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T05:30:00+0530"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 00:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2024-13-01T00:00:00Z"), None);
        assert_eq!(parse_timestamp("not a time"), None);
    }

    #[test]
    fn validate_preserves_order_and_partitions_input() {
        let records = vec![
            record(json!({"sensor_id": "a", "timestamp": "2024-01-01T00:00:00Z", "temperature": 1})),
            record(json!({"timestamp": "2024-01-01T00:00:01Z", "temperature": 2})),
            record(json!({"sensor_id": "c", "timestamp": "2024-01-01T00:00:02Z", "temperature": 3})),
            record(json!({"sensor_id": "d", "timestamp": "bad", "temperature": 4})),
        ];
        let out = Validator::new().validate(records);

        let ids: Vec<&str> = out.valid.iter().map(|r| r.sensor_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(out.invalid.len(), 2);
        assert_eq!(out.invalid[0].messages(), vec!["Missing required field: 'sensor_id'"]);
        assert_eq!(out.invalid[1].record["sensor_id"], "d");
        assert!(out.invalid.iter().all(|v| !v.errors.is_empty()));
    }

    #[test]
    fn validate_empty_input() {
        let out = Validator::new().validate(Vec::new());
        assert!(out.valid.is_empty());
        assert!(out.invalid.is_empty());
    }
}
