//! Stdout publisher for local development
//!
//! Prints envelopes instead of sending them to a broker.

use super::{PublishEnvelope, Publisher};
use crate::error::PublishError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stdout publisher - prints envelopes for debugging
pub struct StdoutPublisher {
    /// Print a framed block per envelope instead of one line
    pretty: bool,
    /// Count of envelopes published
    published_count: AtomicU64,
}

impl StdoutPublisher {
    pub fn new() -> Self {
        Self {
            pretty: false,
            published_count: AtomicU64::new(0),
        }
    }

    pub fn pretty() -> Self {
        Self {
            pretty: true,
            published_count: AtomicU64::new(0),
        }
    }

    /// Get total envelopes published
    pub fn published_count(&self) -> u64 {
        self.published_count.load(Ordering::Relaxed)
    }
}

impl Default for StdoutPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for StdoutPublisher {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn publish(&self, envelope: &PublishEnvelope) -> Result<(), PublishError> {
        use std::io::Write;

        let mut stdout = std::io::stdout().lock();
        let payload = String::from_utf8_lossy(&envelope.payload);
        let key = envelope.ordering_key.as_deref().unwrap_or("-");

        if self.pretty {
            writeln!(stdout, "┌─ Telemetry ─────────────────────────────────────────").ok();
            writeln!(stdout, "│ Ordering key: {key}").ok();
            writeln!(stdout, "│ Payload:      {payload}").ok();
            writeln!(stdout, "└─────────────────────────────────────────────────────").ok();
        } else {
            writeln!(stdout, "[{key}] {payload}").ok();
        }

        self.published_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn health(&self) -> bool {
        true
    }
}
