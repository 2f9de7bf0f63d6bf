//! Paygate - HTTP front-end for Stripe payment webhooks and directory lookups.
//!
//! The `paygate-web` binary wires these modules into one axum server.
//!
//! ## Architecture
//!
//! ```text
//! Stripe → rate limit → /stripe/webhook → WebhookPipeline → Notifier
//! Client → rate limit → /lookup         → Directory
//! ```

pub mod config;
pub mod lookup;
pub mod notify;
pub mod tls;
pub mod web;
pub mod webhook;

// Re-export commonly used types
pub use config::{Config, ConfigError, TlsSettings};
pub use lookup::Directory;
pub use notify::{LogNotifier, MailgunNotifier, Notifier, SendError};
pub use tls::serve_tls;
pub use web::{router, AppState};
pub use webhook::{Deadlines, DispatchOutcome, WebhookPipeline, WebhookSecret, MAX_BODY_BYTES};
