//! Error types for the telemetry gateway

use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level error type for the gateway process
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Publish sink error
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Error type for publish sink operations
///
/// Every variant reaches the ingest caller as a server error; nothing is
/// retried inside the gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Credentials could not be resolved or exchanged for an access token
    #[error("credential error: {0}")]
    Credentials(String),

    /// Broker did not acknowledge within the deadline
    #[error("publish not acknowledged within {0:?}")]
    Timeout(Duration),

    /// Broker answered but refused the publish
    #[error("broker rejected publish ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Request never reached the broker
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be encoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl PublishError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            PublishError::Credentials(_) => "credentials",
            PublishError::Timeout(_) => "timeout",
            PublishError::Rejected { .. } => "rejected",
            PublishError::Transport(_) => "transport",
            PublishError::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for PublishError {
    fn from(err: serde_json::Error) -> Self {
        PublishError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_to_gateway_error() {
        let publish_err = PublishError::Credentials("no key".to_string());
        let err: GatewayError = publish_err.into();
        assert!(matches!(err, GatewayError::Publish(PublishError::Credentials(_))));
    }

    #[test]
    fn test_timeout_is_distinct_from_rejection() {
        let timeout = PublishError::Timeout(Duration::from_secs(30));
        let rejected = PublishError::Rejected {
            status: 403,
            message: "forbidden".to_string(),
        };
        assert_eq!(timeout.kind(), "timeout");
        assert_eq!(rejected.kind(), "rejected");
        assert_ne!(timeout, rejected);
    }
}
