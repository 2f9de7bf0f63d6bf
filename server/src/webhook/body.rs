//! Size-capped request body reading.

use std::time::Duration;

use axum::body::{Body, HttpBody};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use thiserror::Error;

/// Largest webhook body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 65_536;

/// Failures while reading a request body.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The body is larger than the ceiling. Nothing is returned.
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// The stream failed (disconnect, bad framing).
    #[error("failed to read request body: {0}")]
    Io(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The client stopped sending before the body was complete.
    #[error("request body not received within {}ms", .after.as_millis())]
    Timeout { after: Duration },
}

impl ReadError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "too_large",
            Self::Io(_) => "io",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Read the whole body, failing once more than `max_bytes` have arrived.
///
/// A declared `Content-Length` above the ceiling fails before any bytes are
/// polled.
pub async fn read_bounded(body: Body, max_bytes: usize) -> Result<Bytes, ReadError> {
    if body.size_hint().lower() > max_bytes as u64 {
        return Err(ReadError::TooLarge { limit: max_bytes });
    }

    match Limited::new(body, max_bytes).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ReadError::TooLarge { limit: max_bytes })
        }
        Err(e) => Err(ReadError::Io(e)),
    }
}

/// [`read_bounded`] with a deadline on the whole read.
pub async fn read_bounded_within(
    body: Body,
    max_bytes: usize,
    deadline: Duration,
) -> Result<Bytes, ReadError> {
    tokio::time::timeout(deadline, read_bounded(body, max_bytes))
        .await
        .map_err(|_| ReadError::Timeout { after: deadline })?
}
