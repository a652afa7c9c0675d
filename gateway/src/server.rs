//! HTTP ingest API
//!
//! ```text
//! GET  /healthz       liveness, always 200 "ok"
//! GET  /metrics       Prometheus text format
//! POST /ingest        one record    -> 202 {"status":"queued"}
//! POST /ingest/batch  record array  -> 200 {"status":"queued","count":N}
//! ```
//!
//! Ingest routes check `x-api-key` before the body is read. A batch is
//! validated in full before anything is published; publishing then runs in
//! input order and stops at the first failure.

use crate::config::Config;
use crate::error::PublishError;
use crate::metrics;
use crate::ordering::OrderingKeyResolver;
use crate::publish::{PublishEnvelope, Publisher};
use crate::record::{self, TelemetryRecord, ValidationError};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Binary accept/reject policy for ingest requests
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    allow_anon: bool,
    api_key: Option<String>,
}

impl AuthPolicy {
    pub fn new(allow_anon: bool, api_key: Option<String>) -> Self {
        Self { allow_anon, api_key }
    }

    /// Whether a request presenting `key` may ingest
    pub fn permits(&self, key: Option<&str>) -> bool {
        if self.allow_anon {
            return true;
        }
        match (&self.api_key, key) {
            (Some(expected), Some(presented)) => expected == presented,
            _ => false,
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    auth: Arc<AuthPolicy>,
    resolver: Arc<OrderingKeyResolver>,
    publisher: Arc<dyn Publisher>,
}

impl AppState {
    pub fn new(config: &Config, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            auth: Arc::new(AuthPolicy::new(config.allow_anon, config.api_key.clone())),
            resolver: Arc::new(OrderingKeyResolver::new(config.ordering_key_field.clone())),
            publisher,
        }
    }
}

/// Request failures and their HTTP mapping
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Invalid(ValidationError),
    Publish(PublishError),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Invalid(err)
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        ApiError::Publish(err)
    }
}

/// Status code surfaced to the caller for a publish failure
pub fn publish_status(err: &PublishError) -> StatusCode {
    match err {
        PublishError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PublishError::Rejected { .. } | PublishError::Transport(_) => StatusCode::BAD_GATEWAY,
        PublishError::Credentials(_) | PublishError::Serialization(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "unauthorized"})),
            )
                .into_response(),
            ApiError::Invalid(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": err})),
            )
                .into_response(),
            ApiError::Publish(err) => (
                publish_status(&err),
                Json(json!({"detail": err.to_string()})),
            )
                .into_response(),
        }
    }
}

/// Build the router with all routes
pub fn router(state: AppState) -> Router {
    let ingest = Router::new()
        .route("/ingest", post(ingest_one))
        .route("/ingest/batch", post(ingest_batch))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .merge(ingest)
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Ingest API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics::gather(),
    )
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if state.auth.permits(presented) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "Rejected unauthenticated ingest request");
        metrics::try_record_rejected("unauthorized");
        ApiError::Unauthorized.into_response()
    }
}

async fn ingest_one(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    metrics::try_record_received("ingest", 1);

    let record = decode(&body).and_then(|v| TelemetryRecord::from_value(&v));
    let record = record.inspect_err(reject)?;

    publish_record(&state, &record).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({"status": "queued"}))))
}

async fn ingest_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let value = decode(&body).inspect_err(|e| {
        metrics::try_record_received("ingest_batch", 1);
        reject(e);
    })?;
    let received = value.as_array().map_or(1, Vec::len);
    metrics::try_record_received("ingest_batch", received as u64);

    let records = record::validate_batch(&value).inspect_err(reject)?;

    for (index, record) in records.iter().enumerate() {
        if let Err(err) = publish_record(&state, record).await {
            warn!(
                index,
                published = index,
                total = records.len(),
                "Batch publish stopped at first failure"
            );
            return Err(err);
        }
    }

    Ok(Json(json!({"status": "queued", "count": records.len()})))
}

fn decode(body: &[u8]) -> Result<Value, ValidationError> {
    serde_json::from_slice(body)
        .map_err(|e| ValidationError::new("body", format!("invalid JSON: {e}")))
}

fn reject(err: &ValidationError) {
    debug!(field = %err.field, reason = %err.reason, index = ?err.index, "Validation failed");
    metrics::try_record_rejected("validation");
}

/// Serialize, key and publish one record, waiting for the acknowledgement
async fn publish_record(state: &AppState, record: &TelemetryRecord) -> Result<(), ApiError> {
    let envelope = PublishEnvelope::from_record(record, &state.resolver)?;
    let sink = state.publisher.name();

    let started = Instant::now();
    let result = state.publisher.publish(&envelope).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(()) => {
            metrics::try_record_publish(sink, None, elapsed);
            Ok(())
        }
        Err(err) => {
            error!(
                sink,
                kind = err.kind(),
                error = %err,
                equipment_id = %record.equipment_id,
                sensor_id = %record.sensor_id,
                "Publish failed"
            );
            metrics::try_record_publish(sink, Some(err.kind()), elapsed);
            Err(err.into())
        }
    }
}
