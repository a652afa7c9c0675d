//! Publish sinks
//!
//! A [`Publisher`] takes one [`PublishEnvelope`] and delivers it to the
//! message bus, returning only once the bus has acknowledged it (or failed).
//!
//! ```text
//! TelemetryRecord ──► PublishEnvelope { payload, ordering_key } ──► Publisher
//! ```

pub mod credentials;
pub mod memory;
pub mod pubsub;
pub mod stdout;
pub mod token;

use crate::error::PublishError;
use crate::ordering::OrderingKeyResolver;
use crate::record::TelemetryRecord;
use async_trait::async_trait;
use bytes::Bytes;

pub use credentials::{CredentialChain, CredentialSource, Credentials};
pub use memory::MemoryPublisher;
pub use pubsub::{PubSubPublisher, PubSubSettings};
pub use stdout::StdoutPublisher;

/// Payload bytes plus the optional ordering key handed to a publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEnvelope {
    pub payload: Bytes,
    pub ordering_key: Option<String>,
}

impl PublishEnvelope {
    /// Build an envelope; an empty ordering key is treated as no key
    pub fn new(payload: impl Into<Bytes>, ordering_key: Option<String>) -> Self {
        Self {
            payload: payload.into(),
            ordering_key: ordering_key.filter(|k| !k.is_empty()),
        }
    }

    /// Serialize a validated record and resolve its ordering key
    pub fn from_record(
        record: &TelemetryRecord,
        resolver: &OrderingKeyResolver,
    ) -> Result<Self, PublishError> {
        let payload = record.to_payload()?;
        Ok(Self::new(payload, resolver.resolve_record(record)))
    }
}

/// Publisher trait - delivers envelopes to the message bus
///
/// Implementations must be safe to share across concurrent requests.
///
/// # Example
///
/// ```ignore
/// struct LoggingPublisher;
///
/// #[async_trait]
/// impl Publisher for LoggingPublisher {
///     fn name(&self) -> &'static str { "logging" }
///
///     async fn publish(&self, envelope: &PublishEnvelope) -> Result<(), PublishError> {
///         tracing::info!(bytes = envelope.payload.len(), "publish");
///         Ok(())
///     }
///
///     async fn health(&self) -> bool { true }
/// }
/// ```
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publisher name for identification, logging and metrics
    fn name(&self) -> &'static str;

    /// Publish one envelope and wait for the acknowledgement
    async fn publish(&self, envelope: &PublishEnvelope) -> Result<(), PublishError>;

    /// Whether the sink can currently accept publishes
    async fn health(&self) -> bool;

    /// Graceful shutdown
    async fn shutdown(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_ordering_key_dropped() {
        let envelope = PublishEnvelope::new(Bytes::from_static(b"{}"), Some(String::new()));
        assert!(envelope.ordering_key.is_none());
    }

    #[test]
    fn test_from_record() {
        let record = TelemetryRecord::from_value(&json!({
            "timestamp": "2024-05-01T12:00:00Z",
            "equipment_id": "EQ-7",
            "sensor_id": "GNR_003_VIB"
        }))
        .unwrap();

        let keyed = OrderingKeyResolver::new(Some("equipment_id".into()));
        let envelope = PublishEnvelope::from_record(&record, &keyed).unwrap();
        assert_eq!(envelope.ordering_key.as_deref(), Some("EQ-7"));
        assert_eq!(envelope.payload, Bytes::from(record.to_payload().unwrap()));

        let unkeyed = PublishEnvelope::from_record(&record, &OrderingKeyResolver::disabled());
        assert!(unkeyed.unwrap().ordering_key.is_none());
    }
}
