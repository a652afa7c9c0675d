//! Replay an NDJSON file against the ingest API
//!
//! ```bash
//! telemetry-replay --file readings.ndjson \
//!     --url http://localhost:8080/ingest/batch \
//!     --api-key secret123 --batch-size 100 --qps 20
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use telemetry_gateway::config::LogFormat;
use telemetry_gateway::sender::{Sender, SenderOptions};
use telemetry_gateway::telemetry::{self, LogTarget};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "telemetry-replay")]
#[command(about = "Send NDJSON records to /ingest or /ingest/batch")]
struct Args {
    /// NDJSON file, one JSON record per line
    #[arg(long)]
    file: PathBuf,

    /// Target URL: /ingest or /ingest/batch
    #[arg(long)]
    url: String,

    /// Value for the x-api-key header
    #[arg(long)]
    api_key: Option<String>,

    /// Records per request; above 1 posts arrays
    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    /// Maximum requests per second
    #[arg(long, default_value_t = 50.0)]
    qps: f64,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,

    /// Retries for 429/5xx and connection errors
    #[arg(long, default_value_t = 4)]
    retries: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = telemetry::init("info", LogFormat::Pretty, LogTarget::Stderr) {
        eprintln!("failed to initialize logging: {e}");
    }

    if !args.file.exists() {
        error!(file = %args.file.display(), "Input file not found");
        return ExitCode::from(2);
    }

    let options = SenderOptions {
        url: args.url,
        api_key: args.api_key.filter(|k| !k.is_empty()),
        batch_size: args.batch_size,
        qps: args.qps,
        timeout: Duration::try_from_secs_f64(args.timeout).unwrap_or(Duration::from_secs(10)),
        retries: args.retries,
    };

    let sender = match Sender::new(options) {
        Ok(sender) => sender,
        Err(e) => {
            error!(error = %e, "Failed to start sender");
            return ExitCode::FAILURE;
        }
    };

    match sender.run(&args.file).await {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Replay aborted");
            ExitCode::FAILURE
        }
    }
}
