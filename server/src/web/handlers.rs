//! HTTP endpoint handlers.
//!
//! The webhook handler does no work of its own beyond pulling the signature
//! header; everything else is the pipeline's job. Response bodies are short
//! status labels and never echo request content.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::lookup::Directory;
use crate::web::rate_limit::RateLimit;
use crate::webhook::{Acknowledgement, DispatchOutcome, WebhookPipeline, SIGNATURE_HEADER};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: WebhookPipeline,
    pub directory: Arc<Directory>,
    pub rate_limit: RateLimit,
}

impl AppState {
    pub fn new(config: Config, pipeline: WebhookPipeline, directory: Directory) -> Self {
        let rate_limit = RateLimit::per_minute(config.rate_limit_per_minute)
            .trusting_proxy_headers(config.trust_proxy_headers);
        Self {
            config: Arc::new(config),
            pipeline,
            directory: Arc::new(directory),
            rate_limit,
        }
    }
}

/// Minimal JSON body: `{"status": "..."}`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check endpoint.
pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

// =============================================================================
// Stripe Webhook
// =============================================================================

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchOutcome::Acknowledged(Acknowledgement::Handled) => "acknowledged",
            DispatchOutcome::Acknowledged(Acknowledgement::Ignored) => "ignored",
            DispatchOutcome::Rejected(e) => e.reason(),
        };

        (self.status_code(), Json(StatusResponse { status })).into_response()
    }
}

/// Stripe webhook endpoint.
///
/// The raw body is handed to the pipeline untouched; parsing it before
/// verification would break the signature.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> DispatchOutcome {
    // Non-UTF-8 header values are treated as absent
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let outcome = state.pipeline.process(body, signature).await;

    info!(
        status_code = outcome.status_code().as_u16(),
        acknowledged = outcome.is_acknowledged(),
        "stripe_webhook_complete"
    );

    outcome
}

// =============================================================================
// Lookup
// =============================================================================

/// Lookup request body.
#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub id: String,
}

/// Directory lookup endpoint.
pub async fn lookup(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Response {
    match state.directory.get(&request.id) {
        Some(record) => {
            info!(id = %request.id, "lookup_found");
            Json(record.clone()).into_response()
        }
        None => {
            warn!(id = %request.id, "lookup_not_found");
            (
                StatusCode::NOT_FOUND,
                Json(StatusResponse {
                    status: "not_found",
                }),
            )
                .into_response()
        }
    }
}
