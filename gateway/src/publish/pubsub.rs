//! Google Cloud Pub/Sub publisher
//!
//! Publishes through the Pub/Sub REST API:
//!
//! ```text
//! POST {endpoint}/v1/projects/{project}/topics/{topic}:publish
//! {"messages": [{"data": "<base64 payload>", "orderingKey": "..."}]}
//! ```
//!
//! The topic handle (publish URL plus token provider) is created on first
//! use and shared for the lifetime of the publisher. Concurrent first calls
//! wait on a single initialization; a failed initialization is retried by
//! the next call.

use super::credentials::CredentialChain;
use super::token::TokenProvider;
use super::{PublishEnvelope, Publisher};
use crate::config::Config;
use crate::error::PublishError;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// How long a publish may wait for the broker acknowledgement
pub const PUBLISH_DEADLINE: Duration = Duration::from_secs(30);

/// Connection timeout for the REST client
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to publish
#[derive(Debug, Clone)]
pub struct PubSubSettings {
    pub project_id: String,
    pub topic_id: String,
    /// REST endpoint, e.g. `https://pubsub.googleapis.com`
    pub endpoint: String,
    /// Emulator `host:port`; disables credentials when set
    pub emulator_host: Option<String>,
    /// Acknowledgement deadline
    pub deadline: Duration,
}

impl PubSubSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            project_id: config.project_id.clone(),
            topic_id: config.topic_id.clone(),
            endpoint: config.pubsub_endpoint.clone(),
            emulator_host: config.emulator_host.clone(),
            deadline: PUBLISH_DEADLINE,
        }
    }

    pub fn topic_path(&self) -> String {
        format!("projects/{}/topics/{}", self.project_id, self.topic_id)
    }

    fn base_url(&self) -> String {
        match &self.emulator_host {
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None => self.endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub fn publish_url(&self) -> String {
        format!("{}/v1/{}:publish", self.base_url(), self.topic_path())
    }
}

/// Lazily established connection state
struct TopicHandle {
    publish_url: String,
    tokens: Option<TokenProvider>,
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: [OutboundMessage<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundMessage<'a> {
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ordering_key: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Pub/Sub publisher over the REST API
pub struct PubSubPublisher {
    client: Client,
    settings: PubSubSettings,
    credentials: CredentialChain,
    handle: OnceCell<TopicHandle>,
}

impl PubSubPublisher {
    /// Create a publisher; no credentials are resolved until the first publish
    ///
    /// # Errors
    /// Returns `PublishError::Transport` if the HTTP client cannot be created
    pub fn new(settings: PubSubSettings, credentials: CredentialChain) -> Result<Self, PublishError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PublishError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            settings,
            credentials,
            handle: OnceCell::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, PublishError> {
        Self::new(
            PubSubSettings::from_config(config),
            CredentialChain::from_config(config),
        )
    }

    /// Whether the topic handle has been established
    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }

    async fn handle(&self) -> Result<&TopicHandle, PublishError> {
        self.handle
            .get_or_try_init(|| async { self.connect() })
            .await
    }

    fn connect(&self) -> Result<TopicHandle, PublishError> {
        let publish_url = self.settings.publish_url();

        if let Some(host) = &self.settings.emulator_host {
            info!(emulator = %host, topic = %self.settings.topic_path(), "Using Pub/Sub emulator");
            return Ok(TopicHandle {
                publish_url,
                tokens: None,
            });
        }

        let (source, credentials) = self.credentials.resolve()?;
        info!(
            source,
            credentials = credentials.kind(),
            topic = %self.settings.topic_path(),
            "Resolved Pub/Sub credentials"
        );

        Ok(TopicHandle {
            publish_url,
            tokens: Some(TokenProvider::new(self.client.clone(), credentials)),
        })
    }

    async fn send(&self, envelope: &PublishEnvelope) -> Result<String, PublishError> {
        let handle = self.handle().await?;

        let body = PublishRequest {
            messages: [OutboundMessage {
                data: STANDARD.encode(&envelope.payload),
                ordering_key: envelope.ordering_key.as_deref(),
            }],
        };

        let mut request = self.client.post(&handle.publish_url).json(&body);
        if let Some(tokens) = &handle.tokens {
            request = request.bearer_auth(tokens.access_token().await?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let ack: PublishResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Transport(format!("unreadable publish response: {e}")))?;

        ack.message_ids
            .into_iter()
            .next()
            .ok_or_else(|| PublishError::Rejected {
                status: status.as_u16(),
                message: "broker returned no message id".to_string(),
            })
    }
}

#[async_trait]
impl Publisher for PubSubPublisher {
    fn name(&self) -> &'static str {
        "pubsub"
    }

    async fn publish(&self, envelope: &PublishEnvelope) -> Result<(), PublishError> {
        let deadline = self.settings.deadline;
        let message_id = tokio::time::timeout(deadline, self.send(envelope))
            .await
            .map_err(|_| PublishError::Timeout(deadline))??;

        debug!(
            message_id = %message_id,
            ordering_key = envelope.ordering_key.as_deref().unwrap_or(""),
            bytes = envelope.payload.len(),
            "Published"
        );
        Ok(())
    }

    async fn health(&self) -> bool {
        self.handle().await.is_ok()
    }
}
