//! Webhook intake HTTP surface.
//!
//! Accept-and-defer is the sole discipline here: authenticated
//! notifications are parsed once, inserted into the durable queue, and the
//! response never reflects downstream sync outcomes.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use tandem_core::db::{Database, SqliteWebhookQueueRepository, WebhookQueueRepository};
use tandem_core::models::{Source, WebhookEvent};

use crate::error::AppError;
use crate::payload::parse_payload;
use crate::signature::verify_signature;

#[derive(Clone)]
pub struct AppState {
    queue: Arc<SqliteWebhookQueueRepository>,
    /// Empty secret disables signature checking (development only)
    secret: Arc<str>,
    signature_header: Arc<str>,
}

impl AppState {
    /// Build intake state over the shared store.
    #[must_use]
    pub fn new(db: &Database, secret: &str, signature_header: &str) -> Self {
        if secret.is_empty() {
            tracing::warn!(
                "webhook signature checking is DISABLED (empty secret); do not run this in production"
            );
        }
        Self {
            queue: Arc::new(SqliteWebhookQueueRepository::new(db)),
            secret: secret.into(),
            signature_header: signature_header.into(),
        }
    }
}

/// Assemble the intake router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/cloud", post(webhook_cloud))
        .route("/webhook/local", post(webhook_local))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct QueuedResponse {
    queued: bool,
    id: i64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    pending: i64,
    processing: i64,
    timestamp: String,
}

async fn webhook_cloud(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    handle_webhook(&state, Source::Cloud, &headers, &body)
}

async fn webhook_local(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    handle_webhook(&state, Source::Local, &headers, &body)
}

fn handle_webhook(
    state: &AppState,
    source: Source,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(StatusCode, Json<QueuedResponse>), AppError> {
    if !state.secret.is_empty() {
        let signature = headers
            .get(state.signature_header.as_ref())
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::MissingSignature)?;
        if !verify_signature(&state.secret, body, signature) {
            return Err(AppError::SignatureMismatch);
        }
    }

    let parsed = parse_payload(body)?;

    let event = WebhookEvent {
        source,
        doctype: parsed.doctype,
        docname: parsed.docname,
        action: parsed.action,
        raw: parsed.raw,
    };
    let id = state.queue.enqueue(&event)?;

    tracing::info!(
        %source,
        doctype = %event.doctype,
        docname = %event.docname,
        action = %event.action,
        id,
        "webhook queued"
    );

    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued: true, id })))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let counts = state.queue.counts()?;
    Ok(Json(StatusResponse {
        pending: counts.pending,
        processing: counts.processing,
        timestamp: Utc::now().to_rfc3339(),
    }))
}
