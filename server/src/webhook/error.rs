//! Request-terminating webhook failures and their HTTP mapping.

use axum::http::StatusCode;
use thiserror::Error;

use super::body::ReadError;
use super::event::DecodeError;
use super::signature::VerificationError;

/// Any failure that stops the webhook pipeline for one request.
///
/// None of these are retried here; the provider redelivers on its own
/// schedule when the status says so.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Transport(#[from] ReadError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Schema(#[from] DecodeError),
}

impl WebhookError {
    /// Status returned to the provider.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Size failures share the transient status
            Self::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Verification(_) | Self::Schema(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Short diagnostic safe to put in a response body.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Transport(ReadError::TooLarge { .. }) => "payload_too_large",
            Self::Transport(ReadError::Io(_)) => "body_read_failed",
            Self::Transport(ReadError::Timeout { .. }) => "body_read_timeout",
            Self::Verification(_) => "invalid_signature",
            Self::Schema(_) => "invalid_payload",
        }
    }
}
