//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup and handed to the components that
//! need it; nothing re-reads the environment afterwards.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::webhook::{Deadlines, WebhookSecret};

/// Default clock-skew tolerance for Stripe signatures, in seconds.
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: u64 = 300;

/// Default Mailgun API base.
pub const DEFAULT_MAILGUN_API_BASE: &str = "https://api.mailgun.net/";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Mailgun credentials for the HTTP notifier.
#[derive(Clone)]
pub struct MailgunSettings {
    /// Private API key, sent as the basic-auth password
    pub api_key: String,
    /// Sending domain
    pub domain: String,
    /// API base, e.g. `https://api.mailgun.net`
    pub api_base: Url,
}

impl fmt::Debug for MailgunSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailgunSettings")
            .field("api_key", &"<redacted>")
            .field("domain", &self.domain)
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

/// ACME-managed TLS for the public API hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Hostname certificates are requested for (`API_DOMAIN`)
    pub domain: String,
    /// HTTPS listen port
    pub port: u16,
    /// Directory caching issued certificates and the account key
    pub cache_dir: PathBuf,
    /// Contact address registered with the ACME account
    pub contact: Option<String>,
    /// Use the Let's Encrypt production directory (staging otherwise)
    pub production: bool,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the plain HTTP listener (unused when TLS is on)
    pub port: u16,

    /// TLS serving; `None` when `TLS_DISABLED=true`
    pub tls: Option<TlsSettings>,

    /// Key rate limits on `X-Forwarded-For`/`X-Real-IP` instead of the peer
    pub trust_proxy_headers: bool,

    /// Stripe webhook signing secret (`whsec_...`)
    pub stripe_webhook_secret: WebhookSecret,

    /// Maximum clock skew accepted on signed webhook timestamps, in seconds
    pub stripe_signature_tolerance: u64,

    /// Path of the JSON file backing the lookup endpoint
    pub id_db_path: PathBuf,

    /// Domain of the web client allowed to call the lookup endpoint
    pub client_domain: String,

    /// Public API hostname, required when TLS is on
    pub api_domain: Option<String>,

    /// Requests allowed per client IP per minute
    pub rate_limit_per_minute: u32,

    /// Whole-request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Deadline for receiving a webhook body, in milliseconds
    pub body_read_timeout_ms: u64,

    /// Mailgun settings; notifications are only logged when absent
    pub mailgun: Option<MailgunSettings>,

    /// Sender address for payment notifications
    pub notify_from: Option<String>,

    /// Subject line for payment notifications
    pub notify_subject: String,

    /// Timeout for a single notification send, in milliseconds
    pub notify_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            var(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let mailgun = match (var("MAILGUN_API_KEY"), var("MAILGUN_DOMAIN")) {
            (Some(api_key), Some(domain)) if !api_key.is_empty() && !domain.is_empty() => {
                let mut raw_base = var("MAILGUN_API_BASE")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_MAILGUN_API_BASE.to_string());
                // Without the slash, joining drops the last path segment
                if !raw_base.ends_with('/') {
                    raw_base.push('/');
                }
                let api_base = Url::parse(&raw_base).map_err(|e| ConfigError::Invalid {
                    name: "MAILGUN_API_BASE",
                    reason: e.to_string(),
                })?;
                Some(MailgunSettings {
                    api_key,
                    domain,
                    api_base,
                })
            }
            (Some(_), None) | (None, Some(_)) => {
                warn!("mailgun_partially_configured");
                None
            }
            _ => None,
        };

        let api_domain = var("API_DOMAIN").filter(|v| !v.trim().is_empty());

        let tls_disabled: bool = parse_or("TLS_DISABLED", var("TLS_DISABLED"), false);
        let tls = if tls_disabled {
            None
        } else {
            Some(TlsSettings {
                domain: api_domain.clone().ok_or(ConfigError::Missing("API_DOMAIN"))?,
                port: parse_or("TLS_PORT", var("TLS_PORT"), 443),
                cache_dir: PathBuf::from(
                    var("TLS_CACHE_DIR")
                        .filter(|v| !v.is_empty())
                        .unwrap_or_else(|| "acme-cache".to_string()),
                ),
                contact: var("ACME_CONTACT").filter(|v| !v.is_empty()),
                production: !parse_or("ACME_STAGING", var("ACME_STAGING"), false),
            })
        };

        let request_timeout_ms: u64 = parse_or("REQUEST_TIMEOUT_MS", var("REQUEST_TIMEOUT_MS"), 10_000);
        let body_read_timeout_ms: u64 =
            parse_or("WEBHOOK_READ_TIMEOUT_MS", var("WEBHOOK_READ_TIMEOUT_MS"), 5_000);
        let notify_timeout_ms: u64 = parse_or("NOTIFY_TIMEOUT_MS", var("NOTIFY_TIMEOUT_MS"), 4_000);

        // Both inner deadlines must expire before the request timeout does
        if body_read_timeout_ms.saturating_add(notify_timeout_ms) >= request_timeout_ms {
            return Err(ConfigError::Invalid {
                name: "NOTIFY_TIMEOUT_MS",
                reason: format!(
                    "WEBHOOK_READ_TIMEOUT_MS ({body_read_timeout_ms}) plus NOTIFY_TIMEOUT_MS \
                     ({notify_timeout_ms}) must be below REQUEST_TIMEOUT_MS ({request_timeout_ms})"
                ),
            });
        }

        Ok(Config {
            port: parse_or("PORT", var("PORT"), 8080),

            tls,

            trust_proxy_headers: parse_or(
                "TRUST_PROXY_HEADERS",
                var("TRUST_PROXY_HEADERS"),
                false,
            ),

            stripe_webhook_secret: WebhookSecret::new(required("STRIPE_WEBHOOK_SECRET")?),

            stripe_signature_tolerance: parse_or(
                "STRIPE_SIGNATURE_TOLERANCE",
                var("STRIPE_SIGNATURE_TOLERANCE"),
                DEFAULT_SIGNATURE_TOLERANCE_SECS,
            ),

            id_db_path: PathBuf::from(required("ID_DB")?),

            client_domain: required("CLIENT_DOMAIN")?,

            api_domain,

            rate_limit_per_minute: parse_or(
                "RATE_LIMIT_PER_MINUTE",
                var("RATE_LIMIT_PER_MINUTE"),
                100,
            ),

            request_timeout_ms,

            body_read_timeout_ms,

            mailgun,

            notify_from: var("NOTIFY_FROM").filter(|v| !v.is_empty()),

            notify_subject: var("NOTIFY_SUBJECT")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "Thanks for your payment".to_string()),

            notify_timeout_ms,
        })
    }

    /// Per-delivery budgets for the webhook pipeline.
    pub fn deadlines(&self) -> Deadlines {
        Deadlines {
            body_read: Duration::from_millis(self.body_read_timeout_ms),
            notify: Duration::from_millis(self.notify_timeout_ms),
        }
    }
}

/// Parse an optional raw value, falling back to `default` when absent or invalid.
fn parse_or<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr,
{
    let raw = match raw {
        Some(v) => v,
        None => return default,
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "invalid_config_value_using_default");
            default
        }
    }
}
