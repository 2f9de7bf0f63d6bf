//! Outbound payment notifications.
//!
//! The webhook handler only needs "send a receipt to this address". Two
//! senders are provided:
//! - [`LogNotifier`]: records the send in the log and succeeds
//! - [`MailgunNotifier`]: delivers through the Mailgun messages API
//!
//! Senders make a single attempt. Retrying is up to the sender itself, the
//! webhook handler never retries.

pub mod mailgun;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use mailgun::MailgunNotifier;

/// Why a notification could not be delivered.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("notification request timed out")]
    Timeout,

    #[error("notification rejected with status {status}")]
    Rejected { status: u16 },

    #[error("notification transport error: {0}")]
    Transport(String),
}

/// Capability to notify a customer that their payment went through.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Make one delivery attempt to `address`.
    async fn send(&self, address: &str) -> Result<(), SendError>;
}

/// Notifier that only logs.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, address: &str) -> Result<(), SendError> {
        info!(to = %address, "notification_send");
        Ok(())
    }
}
