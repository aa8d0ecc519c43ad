//! HTTP surface: the provider webhook endpoint and a health probe.

pub mod response;

use crate::application::processor::{WebhookOutcome, WebhookProcessor};
use crate::error::EscrowError;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::HeaderMap,
    routing::{get, post},
};
use response::WebhookAck;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const WEBHOOK_PATH: &str = "/webhooks/escrow";
pub const HEALTH_PATH: &str = "/healthz";

#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<WebhookProcessor>,
    /// Lower-cased header carrying the hex HMAC.
    pub signature_header: Arc<str>,
}

impl AppState {
    pub fn new(processor: Arc<WebhookProcessor>, signature_header: &str) -> Self {
        Self {
            processor,
            signature_header: Arc::from(signature_header.to_ascii_lowercase()),
        }
    }
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(receive_webhook))
        .route(HEALTH_PATH, get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Takes the body as raw `Bytes` so the signature covers exactly what the
/// provider sent.
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, EscrowError> {
    let signature = headers
        .get(&*state.signature_header)
        .map(|value| value.to_str())
        .transpose()
        .map_err(|_| EscrowError::Authentication("signature header is not ASCII".to_string()))?;

    match state.processor.handle(&body, signature).await? {
        WebhookOutcome::Processed(_) => Ok(Json(WebhookAck::PROCESSED)),
        WebhookOutcome::AlreadyProcessed => Ok(Json(WebhookAck::IDEMPOTENT)),
    }
}

async fn health() -> Json<WebhookAck> {
    Json(WebhookAck::PROCESSED)
}
