//! OAuth access tokens for the Pub/Sub REST API
//!
//! Tokens are cached and refreshed shortly before they expire. Refreshes are
//! serialized through the cache lock so concurrent publishes trigger at most
//! one token request.

use super::credentials::{AuthorizedUser, Credentials, ServiceAccountKey};
use crate::error::PublishError;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// OAuth scope required for publishing
pub const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";

/// Instance metadata server token endpoint
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the reported expiry
const EXPIRY_SKEW: Duration = Duration::from_secs(60);
/// Assumed lifetime when the endpoint does not report one
const DEFAULT_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Exchanges resolved credentials for bearer tokens
pub struct TokenProvider {
    client: Client,
    credentials: Credentials,
    metadata_url: String,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(client: Client, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
            metadata_url: METADATA_TOKEN_URL.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Override the metadata server endpoint
    pub fn metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = url.into();
        self
    }

    /// Current access token, fetching a new one when the cached one is stale
    pub async fn access_token(&self) -> Result<String, PublishError> {
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.as_ref().filter(|t| Instant::now() < t.refresh_at) {
            return Ok(token.value.clone());
        }

        let response = self.fetch().await?;
        let lifetime = response
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LIFETIME);
        debug!(
            credentials = self.credentials.kind(),
            expires_in_secs = lifetime.as_secs(),
            "Fetched access token"
        );

        let value = response.access_token;
        *cache = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW),
        });
        Ok(value)
    }

    async fn fetch(&self) -> Result<TokenResponse, PublishError> {
        let request = match &self.credentials {
            Credentials::ServiceAccount(key) => {
                let assertion = sign_assertion(key)?;
                self.client.post(&key.token_uri).form(&[
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ])
            }
            Credentials::AuthorizedUser(user) => self.refresh_grant(user),
            Credentials::MetadataServer => self
                .client
                .get(&self.metadata_url)
                .header("Metadata-Flavor", "Google"),
        };

        let response = request.send().await.map_err(|e| {
            PublishError::Credentials(format!("token request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Credentials(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| PublishError::Credentials(format!("invalid token response: {e}")))
    }

    fn refresh_grant(&self, user: &AuthorizedUser) -> reqwest::RequestBuilder {
        self.client.post(&user.token_uri).form(&[
            ("grant_type", "refresh_token"),
            ("client_id", user.client_id.as_str()),
            ("client_secret", user.client_secret.as_str()),
            ("refresh_token", user.refresh_token.as_str()),
        ])
    }
}

/// Sign the RS256 JWT used in the service-account bearer grant
fn sign_assertion(key: &ServiceAccountKey) -> Result<String, PublishError> {
    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| PublishError::Credentials(format!("invalid service account key: {e}")))?;

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let iat = chrono::Utc::now().timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: PUBSUB_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };

    jsonwebtoken::encode(&header, &claims, &signing_key)
        .map_err(|e| PublishError::Credentials(format!("failed to sign assertion: {e}")))
}
