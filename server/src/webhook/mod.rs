//! Stripe webhook ingestion pipeline.
//!
//! ## Processing Flow
//!
//! ```text
//! Body → read_bounded() → SignatureVerifier → decode() → EventDispatcher → Notifier
//!          503              400                 400        200
//! ```
//!
//! Each delivery runs to completion inside its request future. Nothing is
//! spawned, so a dropped connection cancels any in-flight notification.
//!
//! The body read and the notifier call each have their own deadline. Both
//! fit inside the request timeout, so a stalled client gets 503 and a stalled
//! notifier still gets 200.

pub mod body;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod signature;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use tracing::{error, info, warn};

use crate::notify::Notifier;
use crate::Config;

pub use body::{read_bounded, read_bounded_within, ReadError, MAX_BODY_BYTES};
pub use dispatch::{Acknowledgement, DispatchOutcome, EventDispatcher};
pub use error::WebhookError;
pub use event::{decode, DecodeError, EventEnvelope, EventType, PaymentIntent};
pub use signature::{
    sign_header, SignatureVerifier, VerificationError, VerifiedPayload, WebhookSecret,
    SIGNATURE_HEADER,
};

/// Time budgets inside one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub body_read: Duration,
    pub notify: Duration,
}

impl Default for Deadlines {
    fn default() -> Self {
        Self {
            body_read: Duration::from_secs(5),
            notify: Duration::from_secs(4),
        }
    }
}

/// Read, verify, decode and dispatch one webhook delivery.
///
/// Holds only startup configuration, so one instance serves every request.
#[derive(Clone)]
pub struct WebhookPipeline {
    verifier: SignatureVerifier,
    dispatcher: Arc<EventDispatcher>,
    body_read_timeout: Duration,
}

impl WebhookPipeline {
    pub fn new(
        secret: WebhookSecret,
        tolerance_seconds: u64,
        deadlines: Deadlines,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            verifier: SignatureVerifier::new(secret, tolerance_seconds),
            dispatcher: Arc::new(EventDispatcher::new(notifier, deadlines.notify)),
            body_read_timeout: deadlines.body_read,
        }
    }

    /// Build from loaded configuration.
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            config.stripe_webhook_secret.clone(),
            config.stripe_signature_tolerance,
            config.deadlines(),
            notifier,
        )
    }

    /// Run a delivery. `signature_header` is the raw header value, empty
    /// when the request did not carry one.
    pub async fn process(&self, body: Body, signature_header: &str) -> DispatchOutcome {
        match self.ingest(body, signature_header).await {
            Ok(event) => self.dispatcher.dispatch(&event).await,
            Err(e) => DispatchOutcome::Rejected(e),
        }
    }

    async fn ingest(&self, body: Body, signature_header: &str) -> Result<EventEnvelope, WebhookError> {
        // Size is enforced before any signature work
        let payload = read_bounded_within(body, MAX_BODY_BYTES, self.body_read_timeout)
            .await
            .map_err(|e| {
                warn!(reason = e.kind(), error = %e, "stripe_webhook_body_read_failed");
                e
            })?;

        let verified = self.verifier.verify(payload, signature_header)?;

        let event = decode(&verified).map_err(|e| {
            error!(
                payload_length = verified.len(),
                error = %e,
                "stripe_event_decode_failed"
            );
            e
        })?;

        info!(
            event_id = ?event.id,
            event_type = %event.event_type,
            "stripe_event_received"
        );

        Ok(event)
    }
}
