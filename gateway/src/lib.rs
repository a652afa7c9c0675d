//! Telemetry ingest gateway
//!
//! Accepts industrial sensor readings over HTTP, validates them against a
//! fixed schema, and publishes each one to a Pub/Sub topic.
//!
//! # Architecture
//!
//! ```text
//! HTTP body ──► record (validate) ──► ordering (key) ──► publish (sink)
//! ```
//!
//! The publish sink is pluggable via the [`Publisher`] trait. The
//! [`sender`] module is the client side used for replay and load tests.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod ordering;
pub mod publish;
pub mod record;
pub mod sender;
pub mod server;
pub mod telemetry;

pub use config::{Config, LogFormat, SinkKind};
pub use error::{GatewayError, PublishError, Result};
pub use metrics::Metrics;
pub use ordering::OrderingKeyResolver;
pub use publish::{
    MemoryPublisher, PubSubPublisher, PublishEnvelope, Publisher, StdoutPublisher,
};
pub use record::{TelemetryRecord, ValidationError};
pub use sender::{RunSummary, SendError, Sender, SenderOptions};
pub use server::{AppState, router};
