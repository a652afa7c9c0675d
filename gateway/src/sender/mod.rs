//! Replay/load sender
//!
//! Reads an NDJSON file and posts it to the ingest API, one record or one
//! batch at a time. Requests are strictly sequential and paced to a fixed
//! rate. Retryable failures back off exponentially with jitter.
//!
//! # Example
//!
//! ```ignore
//! let sender = Sender::new(SenderOptions {
//!     url: "http://localhost:8080/ingest/batch".into(),
//!     batch_size: 100,
//!     ..Default::default()
//! })?;
//! let summary = sender.run(Path::new("readings.ndjson")).await?;
//! println!("{summary}");
//! ```

pub mod backoff;
pub mod input;

pub use backoff::{RETRYABLE_STATUSES, RetryPolicy, is_retryable_status};
pub use input::{LineError, RecordReader, clean_line};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::server::API_KEY_HEADER;

/// Lowest rate the pacing delay honours
const MIN_QPS: f64 = 0.1;

/// Sender settings, mirroring the CLI flags
#[derive(Debug, Clone)]
pub struct SenderOptions {
    pub url: String,
    pub api_key: Option<String>,
    /// `<= 1` posts single objects; larger posts arrays
    pub batch_size: usize,
    pub qps: f64,
    /// Per-request timeout
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for SenderOptions {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/ingest".to_string(),
            api_key: None,
            batch_size: 1,
            qps: 50.0,
            timeout: Duration::from_secs(10),
            retries: 4,
        }
    }
}

/// Sender errors
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("input error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the sender waits, for backoff and pacing
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Outcome of a full pass over the input
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub ok: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    fn tally(&mut self, count: usize, ok: bool) {
        if ok {
            self.ok += count as u64;
        } else {
            self.failed += count as u64;
        }
    }

    /// `(ok + failed) / elapsed` messages per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.ok + self.failed) as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Done. ok={} fail={} elapsed={:.2}s rate={:.1} msg/s",
            self.ok,
            self.failed,
            self.elapsed.as_secs_f64(),
            self.throughput()
        )
    }
}

/// Sequential NDJSON poster
pub struct Sender {
    client: reqwest::Client,
    options: SenderOptions,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl Sender {
    pub fn new(options: SenderOptions) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(SendError::Client)?;

        Ok(Self {
            client,
            policy: RetryPolicy::default().with_max_retries(options.retries),
            options,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the clock used for backoff and pacing
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Fixed wait after each request or full batch
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.options.qps.max(MIN_QPS))
    }

    /// POST `body`, retrying per the policy
    ///
    /// Returns the number of attempts used on success.
    pub async fn post_with_retry(&self, body: &Value) -> Result<u32, SendError> {
        let payload = serde_json::to_vec(body)?;
        let attempts = self.policy.max_attempts();
        let mut last = String::new();

        for attempt in 0..attempts {
            let mut request = self
                .client
                .post(&self.options.url)
                .header(CONTENT_TYPE, "application/json")
                .body(payload.clone());
            if let Some(key) = &self.options.api_key {
                request = request.header(API_KEY_HEADER, key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if status < 300 {
                        return Ok(attempt + 1);
                    }
                    if !is_retryable_status(status) {
                        let body = response.text().await.unwrap_or_default();
                        error!(status, body = %body, "Request rejected");
                        return Err(SendError::Status { status, body });
                    }
                    warn!(status, attempt = attempt + 1, "Retryable status");
                    last = format!("HTTP {status}");
                }
                Err(e) => {
                    warn!(error = %e, attempt = attempt + 1, "Request error");
                    last = e.to_string();
                }
            }

            if attempt + 1 < attempts {
                let delay = self.policy.delay(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                self.sleeper.sleep(delay).await;
            }
        }

        Err(SendError::Exhausted { attempts, last })
    }

    async fn deliver(&self, body: &Value) -> bool {
        match self.post_with_retry(body).await {
            Ok(_) => true,
            Err(SendError::Status { .. }) => false,
            Err(e) => {
                error!(error = %e, "Request failed");
                false
            }
        }
    }

    /// Post every record in `path` and summarize
    pub async fn run(&self, path: &Path) -> Result<RunSummary, SendError> {
        let started = Instant::now();
        let mut reader = RecordReader::open(path).await?;
        let mut summary = RunSummary::default();
        let delay = self.pacing_delay();
        let batch_size = self.options.batch_size;
        let mut batch: Vec<Value> = Vec::new();

        while let Some(item) = reader.next_record().await? {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    error!(line = e.line(), error = %e, "Skipping unparseable line");
                    summary.failed += 1;
                    continue;
                }
            };

            if batch_size <= 1 {
                let ok = self.deliver(&record).await;
                summary.tally(1, ok);
                self.sleeper.sleep(delay).await;
                continue;
            }

            batch.push(record);
            if batch.len() >= batch_size {
                let count = batch.len();
                let ok = self.deliver(&Value::Array(std::mem::take(&mut batch))).await;
                summary.tally(count, ok);
                self.sleeper.sleep(delay).await;
            }
        }

        // Remainder is not paced
        if !batch.is_empty() {
            let count = batch.len();
            let ok = self.deliver(&Value::Array(batch)).await;
            summary.tally(count, ok);
        }

        summary.elapsed = started.elapsed();
        Ok(summary)
    }
}
