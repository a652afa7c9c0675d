//! Tracing subscriber setup shared by both binaries

use crate::config::LogFormat;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str, format: LogFormat, target: LogTarget) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match (format, target) {
        (LogFormat::Json, LogTarget::Stdout) => tracing_subscriber::fmt::layer().json().boxed(),
        (LogFormat::Json, LogTarget::Stderr) => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        (LogFormat::Pretty, LogTarget::Stdout) => tracing_subscriber::fmt::layer().boxed(),
        (LogFormat::Pretty, LogTarget::Stderr) => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()
}
