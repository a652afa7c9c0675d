//! Ordering key derivation
//!
//! Messages that share an ordering key are delivered by the bus in publish
//! order. The key comes from one configured record field; when nothing is
//! configured, or the field is missing, messages carry no key.

use crate::record::TelemetryRecord;
use serde_json::{Map, Value};

/// Derives an optional ordering key from a configured field name
#[derive(Debug, Clone, Default)]
pub struct OrderingKeyResolver {
    field: Option<String>,
}

impl OrderingKeyResolver {
    /// Create a resolver keyed on `field`; `None` or an empty name disables it
    pub fn new(field: Option<String>) -> Self {
        Self {
            field: field.filter(|f| !f.is_empty()),
        }
    }

    /// Resolver that never produces a key
    pub fn disabled() -> Self {
        Self { field: None }
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Resolve the key from a flat field map
    ///
    /// Strings pass through, other scalars use their JSON text. Null, absent
    /// and empty values yield no key.
    pub fn resolve(&self, fields: &Map<String, Value>) -> Option<String> {
        let value = fields.get(self.field.as_deref()?)?;
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn resolve_record(&self, record: &TelemetryRecord) -> Option<String> {
        self.field.as_ref()?;
        self.resolve(&record.to_field_map())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn record() -> TelemetryRecord {
        TelemetryRecord::from_value(&json!({
            "timestamp": "2024-05-01T12:00:00Z",
            "equipment_id": "EQ-7",
            "sensor_id": "TBN_001_TMP",
            "value": 3.5
        }))
        .unwrap()
    }

    #[test]
    fn test_configured_field() {
        let resolver = OrderingKeyResolver::new(Some("equipment_id".into()));
        assert_eq!(resolver.resolve_record(&record()).as_deref(), Some("EQ-7"));
    }

    #[test]
    fn test_unconfigured_never_keys() {
        let resolver = OrderingKeyResolver::new(None);
        assert!(resolver.resolve_record(&record()).is_none());
        assert!(OrderingKeyResolver::new(Some(String::new())).field().is_none());
        assert!(OrderingKeyResolver::disabled().resolve(&fields(json!({"a": "b"}))).is_none());
    }

    #[test]
    fn test_scalars_are_stringified() {
        let map = fields(json!({"n": 42, "f": 3.5, "b": true, "s": "x"}));
        let key = |f: &str| OrderingKeyResolver::new(Some(f.into())).resolve(&map);
        assert_eq!(key("n").as_deref(), Some("42"));
        assert_eq!(key("f").as_deref(), Some("3.5"));
        assert_eq!(key("b").as_deref(), Some("true"));
        assert_eq!(key("s").as_deref(), Some("x"));
    }

    #[test]
    fn test_absent_null_and_empty_yield_no_key() {
        let map = fields(json!({"unit": null, "blank": ""}));
        for field in ["unit", "blank", "missing"] {
            let resolver = OrderingKeyResolver::new(Some(field.into()));
            assert!(resolver.resolve(&map).is_none(), "{field}");
        }
        let resolver = OrderingKeyResolver::new(Some("unit".into()));
        assert!(resolver.resolve_record(&record()).is_none());
    }
}
