//! Mailgun-backed notifier.
//! Reference: https://documentation.mailgun.com/docs/mailgun/api-reference/openapi-final/tag/Messages/

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info};
use url::Url;

use super::{Notifier, SendError};
use crate::config::MailgunSettings;

const RECEIPT_TEXT: &str =
    "We received your payment. Thank you!\n\nThis message was sent automatically, please do not reply.";

/// Sends payment receipts through `POST /v3/{domain}/messages`.
#[derive(Clone)]
pub struct MailgunNotifier {
    client: Client,
    endpoint: Url,
    api_key: String,
    from: String,
    subject: String,
}

impl MailgunNotifier {
    /// Build a notifier. `from` defaults to `receipts@{domain}`.
    pub fn new(
        settings: &MailgunSettings,
        from: Option<String>,
        subject: String,
        timeout: Duration,
    ) -> Result<Self> {
        // Keep any path prefix on the base as a directory
        let mut base = settings.api_base.clone();
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }

        let endpoint = base
            .join(&format!("v3/{}/messages", settings.domain))
            .context("Failed to build Mailgun messages URL")?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key: settings.api_key.clone(),
            from: from.unwrap_or_else(|| format!("receipts@{}", settings.domain)),
            subject,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn send(&self, address: &str) -> Result<(), SendError> {
        info!(to = %address, endpoint = %self.endpoint, "mailgun_send_starting");

        let form = [
            ("from", self.from.as_str()),
            ("to", address),
            ("subject", self.subject.as_str()),
            ("text", RECEIPT_TEXT),
        ];

        let response = self
            .client
            .post(self.endpoint.clone())
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!(to = %address, error = %e, "mailgun_send_timeout");
                    SendError::Timeout
                } else {
                    error!(to = %address, error = %e, "mailgun_send_error");
                    SendError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(to = %address, status_code = status.as_u16(), "mailgun_send_rejected");
            return Err(SendError::Rejected {
                status: status.as_u16(),
            });
        }

        info!(to = %address, status_code = status.as_u16(), "mailgun_send_complete");

        Ok(())
    }
}
