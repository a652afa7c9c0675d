//! Telemetry record schema and validation
//!
//! Turns one decoded JSON element into a [`TelemetryRecord`] or a
//! [`ValidationError`] naming the offending field. Validation is pure: a
//! record that fails here never reaches a publisher.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

/// Two equipment families, a 3-digit unit number, three measurement types
pub const SENSOR_ID_PATTERN: &str = r"^(TBN|GNR)_[0-9]{3}_(TMP|VIB|PRS)$";

#[allow(clippy::expect_used)]
static SENSOR_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SENSOR_ID_PATTERN).expect("sensor_id pattern compiles"));

/// Numeric timestamps larger than this are read as milliseconds
const EPOCH_MILLIS_THRESHOLD: f64 = 2e10;

/// Accepted input names for the timestamp, in precedence order
const TIMESTAMP_FIELDS: [&str; 2] = ["timestamp", "event_ts"];

/// A validated telemetry reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<FixedOffset>,
    pub equipment_id: String,
    pub sensor_id: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

/// Why a record was refused
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
    /// Position in a batch, when the record came from one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
            index: None,
        }
    }

    /// Tag the error with its batch position
    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl TelemetryRecord {
    /// Validate one JSON object against the record schema
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ValidationError::new("body", "expected a JSON object"))?;

        let timestamp = parse_timestamp(obj)?;

        let equipment_id = required_str(obj, "equipment_id")?;
        if equipment_id.is_empty() {
            return Err(ValidationError::new("equipment_id", "must not be empty"));
        }

        let sensor_id = required_str(obj, "sensor_id")?;
        if !is_valid_sensor_id(sensor_id) {
            return Err(ValidationError::new("sensor_id", "invalid sensor_id format"));
        }

        Ok(Self {
            timestamp,
            equipment_id: equipment_id.to_string(),
            sensor_id: sensor_id.to_string(),
            value: optional_number(obj, "value")?,
            unit: optional_str(obj, "unit")?,
        })
    }

    /// Canonical compact JSON payload
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// The record as a flat field map, keyed by canonical field names
    pub fn to_field_map(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            "timestamp".into(),
            Value::String(format_timestamp(&self.timestamp)),
        );
        fields.insert(
            "equipment_id".into(),
            Value::String(self.equipment_id.clone()),
        );
        fields.insert("sensor_id".into(), Value::String(self.sensor_id.clone()));
        fields.insert(
            "value".into(),
            self.value
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number),
        );
        fields.insert(
            "unit".into(),
            self.unit.clone().map_or(Value::Null, Value::String),
        );
        fields
    }
}

/// Validate every element of a JSON array, stopping at the first failure
pub fn validate_batch(value: &Value) -> Result<Vec<TelemetryRecord>, ValidationError> {
    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::new("body", "expected a JSON array"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| TelemetryRecord::from_value(item).map_err(|e| e.at(index)))
        .collect()
}

/// Full-match check of a sensor identifier
pub fn is_valid_sensor_id(sensor_id: &str) -> bool {
    SENSOR_ID.is_match(sensor_id)
}

fn parse_timestamp(obj: &Map<String, Value>) -> Result<DateTime<FixedOffset>, ValidationError> {
    let raw = TIMESTAMP_FIELDS
        .iter()
        .find_map(|name| obj.get(*name).filter(|v| !v.is_null()))
        .ok_or_else(|| ValidationError::new("timestamp", "field required"))?;

    if let Value::Number(n) = raw {
        return n
            .as_f64()
            .and_then(from_epoch)
            .ok_or_else(|| ValidationError::new("timestamp", "epoch timestamp out of range"));
    }

    let text = raw.as_str().ok_or_else(|| {
        ValidationError::new("timestamp", "expected an RFC 3339 string or epoch number")
    })?;

    DateTime::parse_from_rfc3339(text).map_err(|e| {
        if looks_naive(text) {
            ValidationError::new("timestamp", "timezone offset required")
        } else {
            ValidationError::new("timestamp", format!("invalid datetime: {e}"))
        }
    })
}

/// Unix epoch as a UTC instant; magnitudes above `EPOCH_MILLIS_THRESHOLD`
/// are milliseconds
fn from_epoch(epoch: f64) -> Option<DateTime<FixedOffset>> {
    if !epoch.is_finite() {
        return None;
    }
    let secs = if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
        epoch / 1000.0
    } else {
        epoch
    };
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp(whole as i64, nanos).map(|utc| utc.fixed_offset())
}

fn looks_naive(text: &str) -> bool {
    text.parse::<NaiveDateTime>().is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").is_ok()
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ValidationError::new(field, "field required")),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ValidationError::new(field, "expected a string")),
    }
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ValidationError::new(field, "expected a string")),
    }
}

fn optional_number(obj: &Map<String, Value>, field: &str) -> Result<Option<f64>, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| ValidationError::new(field, "expected a number")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ValidationError::new(field, "expected a number")),
        Some(_) => Err(ValidationError::new(field, "expected a number")),
    }
}

fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn serialize_timestamp<S>(ts: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(ts))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading(sensor_id: &str) -> Value {
        json!({
            "timestamp": "2024-05-01T12:00:00Z",
            "equipment_id": "EQ-7",
            "sensor_id": sensor_id,
            "value": 71.5,
            "unit": "C"
        })
    }

    #[test]
    fn test_accepts_known_sensor_ids() {
        for id in ["TBN_001_TMP", "GNR_999_VIB", "TBN_042_PRS"] {
            assert!(TelemetryRecord::from_value(&reading(id)).is_ok(), "{id}");
        }
    }

    #[test]
    fn test_rejects_malformed_sensor_ids() {
        for id in [
            "XYZ_001_TMP",
            "TBN_1_TMP",
            "TBN_0001_TMP",
            "TBN_001_HUM",
            "tbn_001_tmp",
            "TBN_001_TMP ",
            "xTBN_001_TMP",
            "",
        ] {
            let err = TelemetryRecord::from_value(&reading(id)).unwrap_err();
            assert_eq!(err.field, "sensor_id", "{id}");
            assert_eq!(err.reason, "invalid sensor_id format");
        }
    }

    #[test]
    fn test_naive_timestamp_rejected() {
        let mut value = reading("TBN_001_TMP");
        value["timestamp"] = json!("2024-05-01T12:00:00");
        let err = TelemetryRecord::from_value(&value).unwrap_err();
        assert_eq!(err.field, "timestamp");
        assert_eq!(err.reason, "timezone offset required");

        value["timestamp"] = json!("2024-05-01T12:00:00+02:00");
        let record = TelemetryRecord::from_value(&value).unwrap();
        assert_eq!(record.timestamp.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn test_epoch_timestamp_is_utc() {
        let mut value = reading("TBN_001_TMP");
        value["timestamp"] = json!(1714564800);
        let record = TelemetryRecord::from_value(&value).unwrap();
        assert_eq!(record.timestamp.offset().local_minus_utc(), 0);
        assert_eq!(record.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");

        value["timestamp"] = json!(1714564800.25);
        let record = TelemetryRecord::from_value(&value).unwrap();
        assert_eq!(record.timestamp.timestamp_subsec_millis(), 250);

        // Milliseconds
        value["timestamp"] = json!(1714564800000_i64);
        let record = TelemetryRecord::from_value(&value).unwrap();
        assert_eq!(record.timestamp.timestamp(), 1714564800);

        value["timestamp"] = json!(1e300);
        let err = TelemetryRecord::from_value(&value).unwrap_err();
        assert_eq!(err.field, "timestamp");
    }

    #[test]
    fn test_event_ts_alias() {
        let value = json!({
            "event_ts": "2024-05-01T12:00:00-03:00",
            "equipment_id": "EQ-7",
            "sensor_id": "GNR_010_PRS"
        });
        let record = TelemetryRecord::from_value(&value).unwrap();
        assert_eq!(record.timestamp.to_rfc3339(), "2024-05-01T12:00:00-03:00");
        assert!(record.value.is_none());
        assert!(record.unit.is_none());
    }

    #[test]
    fn test_timestamp_wins_over_event_ts() {
        let mut value = reading("TBN_001_TMP");
        value["event_ts"] = json!("not a date");
        assert!(TelemetryRecord::from_value(&value).is_ok());
    }

    #[test]
    fn test_missing_timestamp() {
        let mut value = reading("TBN_001_TMP");
        value.as_object_mut().unwrap().remove("timestamp");
        let err = TelemetryRecord::from_value(&value).unwrap_err();
        assert_eq!(err.field, "timestamp");
        assert_eq!(err.reason, "field required");
    }

    #[test]
    fn test_required_strings() {
        let mut value = reading("TBN_001_TMP");
        value["equipment_id"] = json!("");
        assert_eq!(
            TelemetryRecord::from_value(&value).unwrap_err().field,
            "equipment_id"
        );

        value["equipment_id"] = json!(17);
        let err = TelemetryRecord::from_value(&value).unwrap_err();
        assert_eq!(err.reason, "expected a string");
    }

    #[test]
    fn test_value_coercion() {
        let mut value = reading("TBN_001_TMP");
        value["value"] = json!("12.25");
        assert_eq!(
            TelemetryRecord::from_value(&value).unwrap().value,
            Some(12.25)
        );

        value["value"] = json!("hot");
        assert_eq!(
            TelemetryRecord::from_value(&value).unwrap_err().field,
            "value"
        );
    }

    #[test]
    fn test_non_object_rejected() {
        let err = TelemetryRecord::from_value(&json!([1, 2])).unwrap_err();
        assert_eq!(err.field, "body");
    }

    #[test]
    fn test_payload_is_canonical() {
        let mut value = reading("TBN_001_TMP");
        value["extra"] = json!("dropped");
        value["value"] = json!(21);
        let record = TelemetryRecord::from_value(&value).unwrap();
        let payload: Value = serde_json::from_slice(&record.to_payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            json!({
                "timestamp": "2024-05-01T12:00:00Z",
                "equipment_id": "EQ-7",
                "sensor_id": "TBN_001_TMP",
                "value": 21.0,
                "unit": "C"
            })
        );
        assert_eq!(Value::Object(record.to_field_map()), payload);
    }

    #[test]
    fn test_batch_reports_first_invalid_index() {
        let batch = json!([reading("TBN_001_TMP"), reading("BAD"), reading("ALSO_BAD")]);
        let err = validate_batch(&batch).unwrap_err();
        assert_eq!(err.index, Some(1));
        assert_eq!(err.field, "sensor_id");

        let ok = validate_batch(&json!([reading("TBN_001_TMP"), reading("GNR_002_VIB")]));
        assert_eq!(ok.unwrap().len(), 2);

        assert_eq!(validate_batch(&json!({})).unwrap_err().field, "body");
    }
}
