//! Shared fixtures for router-level tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use serde_json::{json, Value};
use tokio::sync::Notify;

use paygate::webhook::sign_header;
use paygate::{router, AppState, Config, Directory, Notifier, SendError, WebhookPipeline};

pub const SECRET: &str = "whsec_integration_secret";

/// Notifier that records every address and optionally fails.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, address: &str) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(address.to_string());
        if self.fail {
            Err(SendError::Transport("smtp down".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Config with the required variables set; `overrides` win.
pub fn config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("STRIPE_WEBHOOK_SECRET", SECRET),
        ("ID_DB", "/unused/ids.json"),
        ("CLIENT_DOMAIN", "app.example.com"),
        ("TLS_DISABLED", "true"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_vars(|name| vars.get(name).cloned()).unwrap()
}

/// Config for an app behind a proxy that sets `X-Forwarded-For`.
/// Notifier whose send never completes. Records when a send starts and
/// when its future is dropped.
#[derive(Default)]
pub struct StalledNotifier {
    pub started: Notify,
    dropped: Arc<AtomicBool>,
}

impl StalledNotifier {
    pub fn was_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for StalledNotifier {
    async fn send(&self, _address: &str) -> Result<(), SendError> {
        let _flag = DropFlag(self.dropped.clone());
        self.started.notify_one();
        std::future::pending().await
    }
}

pub fn test_config(rate_limit_per_minute: u32) -> Config {
    config_with(&[
        ("RATE_LIMIT_PER_MINUTE", rate_limit_per_minute.to_string().as_str()),
        ("TRUST_PROXY_HEADERS", "true"),
    ])
}

pub fn test_directory() -> Directory {
    Directory::from_records(HashMap::from([(
        "u1".to_string(),
        json!({"name": "Ada", "email": "ada@example.com"}),
    )]))
}

pub fn app_for(config: Config, notifier: Arc<dyn Notifier>) -> Router {
    let pipeline = WebhookPipeline::from_config(&config, notifier);
    router(AppState::new(config, pipeline, test_directory()))
}

pub fn test_app_with(notifier: Arc<dyn Notifier>, rate_limit_per_minute: u32) -> Router {
    app_for(test_config(rate_limit_per_minute), notifier)
}

pub fn test_app(notifier: Arc<dyn Notifier>) -> Router {
    test_app_with(notifier, 1_000)
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// A webhook request signed with `secret` at the current time.
pub fn signed_request(payload: &[u8], secret: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/stripe/webhook")
        .header("content-type", "application/json")
        .header("Stripe-Signature", sign_header(payload, secret.as_bytes(), now()))
        .body(Body::from(payload.to_vec()))
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
