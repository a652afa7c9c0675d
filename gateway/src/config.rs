//! Configuration for the telemetry gateway
//!
//! Built once at startup from environment variables and handed to every
//! component that needs it.

use crate::error::{GatewayError, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default topic when `TOPIC_ID` is not set
pub const DEFAULT_TOPIC_ID: &str = "telemetry-events";

/// Default Pub/Sub REST endpoint
pub const DEFAULT_PUBSUB_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Main configuration for the gateway
#[derive(Debug, Clone)]
pub struct Config {
    /// Target project (`PROJECT_ID`, required)
    pub project_id: String,

    /// Target topic (`TOPIC_ID`)
    pub topic_id: String,

    /// Skip the `x-api-key` check (`ALLOW_ANON`)
    pub allow_anon: bool,

    /// Expected `x-api-key` value (`API_KEY`)
    pub api_key: Option<String>,

    /// Record field used as the ordering key (`ORDERING_KEY_FIELD`)
    pub ordering_key_field: Option<String>,

    /// Credential document path (`CREDENTIALS_PATH`)
    pub credentials_path: Option<PathBuf>,

    /// Base64 credential document (`CREDENTIALS_JSON_B64`)
    pub credentials_json_b64: Option<String>,

    /// HTTP listen address (`BIND_ADDR`, or `0.0.0.0:$PORT`)
    pub bind_addr: SocketAddr,

    /// Where validated records go (`PUBLISH_SINK`)
    pub sink: SinkKind,

    /// Pub/Sub REST endpoint (`PUBSUB_ENDPOINT`)
    pub pubsub_endpoint: String,

    /// Pub/Sub emulator `host:port` (`PUBSUB_EMULATOR_HOST`)
    pub emulator_host: Option<String>,

    /// Log level (`LOG_LEVEL`)
    pub log_level: String,

    /// Log format (`LOG_FORMAT`, json or pretty)
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    PubSub,
    Stdout,
}

impl Config {
    /// Configuration with defaults for everything except the project
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            topic_id: DEFAULT_TOPIC_ID.to_string(),
            allow_anon: false,
            api_key: None,
            ordering_key_field: None,
            credentials_path: None,
            credentials_json_b64: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            sink: SinkKind::PubSub,
            pubsub_endpoint: DEFAULT_PUBSUB_ENDPOINT.to_string(),
            emulator_host: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Empty and whitespace-only values are treated the same as unset ones.
    /// `API_KEY` is kept byte for byte; everything else is trimmed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get = |key: &str| raw(key).map(|v| v.trim().to_string());

        let project_id =
            get("PROJECT_ID").ok_or_else(|| GatewayError::Config("PROJECT_ID is required".into()))?;
        let mut config = Config::new(project_id);

        if let Some(topic) = get("TOPIC_ID") {
            config.topic_id = topic;
        }

        if let Some(flag) = get("ALLOW_ANON") {
            config.allow_anon = parse_bool("ALLOW_ANON", &flag)?;
        }

        config.api_key = raw("API_KEY");
        config.ordering_key_field = get("ORDERING_KEY_FIELD");
        config.credentials_path = get("CREDENTIALS_PATH").map(PathBuf::from);
        config.credentials_json_b64 = get("CREDENTIALS_JSON_B64");
        config.emulator_host = get("PUBSUB_EMULATOR_HOST");

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| GatewayError::Config(format!("invalid BIND_ADDR: {e}")))?;
        } else if let Some(port) = get("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|e| GatewayError::Config(format!("invalid PORT: {e}")))?;
            config.bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
        }

        if let Some(sink) = get("PUBLISH_SINK") {
            config.sink = match sink.to_lowercase().as_str() {
                "pubsub" => SinkKind::PubSub,
                "stdout" => SinkKind::Stdout,
                other => {
                    return Err(GatewayError::Config(format!(
                        "invalid PUBLISH_SINK: {other} (expected 'pubsub' or 'stdout')"
                    )));
                }
            };
        }

        if let Some(endpoint) = get("PUBSUB_ENDPOINT") {
            config.pubsub_endpoint = endpoint;
        }

        if let Some(level) = get("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = get("LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(GatewayError::Config(format!(
                        "invalid LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )));
                }
            };
        }

        Ok(config)
    }

    /// `projects/{project}/topics/{topic}`
    pub fn topic_path(&self) -> String {
        format!("projects/{}/topics/{}", self.project_id, self.topic_id)
    }

    /// True when ingest requests can never pass the key check
    pub fn rejects_all_ingest(&self) -> bool {
        !self.allow_anon && self.api_key.is_none()
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GatewayError::Config(format!(
            "invalid {key}: {other} (expected a boolean)"
        ))),
    }
}
