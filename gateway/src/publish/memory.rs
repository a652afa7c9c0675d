//! In-memory publisher
//!
//! Keeps every published envelope in order. Can be told to start failing
//! after a number of successful publishes, which is how the ingest tests
//! exercise broker outages.

use super::{PublishEnvelope, Publisher};
use crate::error::PublishError;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Publisher that records envelopes in memory
#[derive(Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<PublishEnvelope>>,
    failure: Mutex<Option<(usize, PublishError)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every publish once `after` envelopes have been accepted
    pub fn fail_after(self, after: usize, error: PublishError) -> Self {
        *self.failure.lock() = Some((after, error));
        self
    }

    /// Stop injecting failures
    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// Snapshot of everything published so far
    pub fn published(&self) -> Vec<PublishEnvelope> {
        self.published.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.published.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.lock().is_empty()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, envelope: &PublishEnvelope) -> Result<(), PublishError> {
        let mut published = self.published.lock();
        if let Some((after, error)) = self.failure.lock().as_ref() {
            if published.len() >= *after {
                return Err(error.clone());
            }
        }
        published.push(envelope.clone());
        Ok(())
    }

    async fn health(&self) -> bool {
        self.failure.lock().is_none()
    }
}
