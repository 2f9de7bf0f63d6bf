//! Web server module.
//!
//! Routes:
//! - `GET /health`: liveness, not rate limited
//! - `POST /stripe/webhook`: Stripe event receiver
//! - `POST /lookup`: directory lookup, CORS-enabled for the client domain
//!
//! Every route except `/health` is limited per client IP.

pub mod handlers;
pub mod rate_limit;

use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

pub use handlers::{
    health, lookup, stripe_webhook, AppState, LookupRequest, StatusResponse,
};
pub use rate_limit::{client_ip, limit_by_ip, RateLimit};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = lookup_cors(&state.config.client_domain);
    let timeout = Duration::from_millis(state.config.request_timeout_ms);

    let limited = Router::new()
        // The CORS layer answers every OPTIONS request itself
        .route("/lookup", post(lookup).layer(cors))
        .route("/stripe/webhook", post(stripe_webhook))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            limit_by_ip,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(limited)
        // Config keeps this above the webhook's body-read plus notify deadlines
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy admitting only `https://{client_domain}`.
fn lookup_cors(client_domain: &str) -> CorsLayer {
    let allowed = format!("https://{client_domain}");

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _request_parts| origin.as_bytes() == allowed.as_bytes(),
        ))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
}
