//! Telemetry ingest gateway
//!
//! ## Usage
//!
//! ```bash
//! # Publish to Pub/Sub with an API key
//! PROJECT_ID=plant-a API_KEY=secret123 cargo run --bin telemetry-gateway
//!
//! # Local development, print instead of publishing
//! PROJECT_ID=dev ALLOW_ANON=true PUBLISH_SINK=stdout cargo run
//! ```
//!
//! ## Environment Variables
//!
//! - `PROJECT_ID`: Pub/Sub project (required)
//! - `TOPIC_ID`: topic name (default: "telemetry-events")
//! - `API_KEY` / `ALLOW_ANON`: ingest authentication
//! - `ORDERING_KEY_FIELD`: record field used as ordering key
//! - `CREDENTIALS_PATH` / `CREDENTIALS_JSON_B64`: explicit credentials
//! - `PORT` or `BIND_ADDR`: listen address (default: "0.0.0.0:8080")
//! - `LOG_LEVEL` / `LOG_FORMAT`: logging (default: "info", "pretty")
//!
//! A `.env` file in the working directory is loaded first.

use std::sync::Arc;
use telemetry_gateway::config::{Config, SinkKind};
use telemetry_gateway::metrics::Metrics;
use telemetry_gateway::publish::{PubSubPublisher, Publisher, StdoutPublisher};
use telemetry_gateway::server::{self, AppState};
use telemetry_gateway::telemetry::{self, LogTarget};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    telemetry::init(&config.log_level, config.log_format, LogTarget::Stdout)?;
    Metrics::init()?;

    info!(
        bind_addr = %config.bind_addr,
        topic = %config.topic_path(),
        sink = ?config.sink,
        ordering_key_field = ?config.ordering_key_field,
        "Starting telemetry gateway"
    );

    if config.rejects_all_ingest() {
        warn!("No API_KEY set and ALLOW_ANON is false; every ingest request will get 401");
    }

    let publisher: Arc<dyn Publisher> = match config.sink {
        SinkKind::PubSub => Arc::new(PubSubPublisher::from_config(&config)?),
        SinkKind::Stdout => {
            info!("Publishing to stdout (debug mode)");
            Arc::new(StdoutPublisher::pretty())
        }
    };

    let state = AppState::new(&config, Arc::clone(&publisher));
    let listener = TcpListener::bind(config.bind_addr).await?;

    server::serve(listener, state, shutdown_signal()).await?;

    if let Err(e) = publisher.shutdown().await {
        warn!(error = %e, "Publisher shutdown failed");
    }
    info!("Telemetry gateway shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
