//! Paygate Web Server.
//!
//! This binary:
//! - Loads configuration and the lookup directory
//! - Serves the Stripe webhook and lookup endpoints behind a per-IP rate limit
//! - Serves HTTPS on `TLS_PORT` for `API_DOMAIN`, or plain HTTP on `PORT`
//!   when `TLS_DISABLED=true`
//! - Shuts down gracefully on SIGINT/SIGTERM

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use paygate::{
    router, serve_tls, AppState, Config, Directory, LogNotifier, MailgunNotifier, Notifier,
    WebhookPipeline,
};

/// How often idle rate-limit entries are pruned.
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        port = config.port,
        tls_enabled = config.tls.is_some(),
        trust_proxy_headers = config.trust_proxy_headers,
        api_domain = ?config.api_domain,
        client_domain = %config.client_domain,
        signature_tolerance_seconds = config.stripe_signature_tolerance,
        rate_limit_per_minute = config.rate_limit_per_minute,
        mailgun_configured = config.mailgun.is_some(),
        "config_loaded"
    );

    let directory = Directory::load(&config.id_db_path)?;

    let notifier: Arc<dyn Notifier> = match &config.mailgun {
        Some(settings) => {
            info!(domain = %settings.domain, "notifier_mailgun");
            Arc::new(MailgunNotifier::new(
                settings,
                config.notify_from.clone(),
                config.notify_subject.clone(),
                Duration::from_millis(config.notify_timeout_ms),
            )?)
        }
        None => {
            info!("notifier_log_only");
            Arc::new(LogNotifier)
        }
    };

    let pipeline = WebhookPipeline::from_config(&config, notifier);

    let port = config.port;
    let tls = config.tls.clone();
    let state = AppState::new(config, pipeline, directory);

    // Prune rate-limit state for clients that have gone quiet
    let rate_limit = state.rate_limit.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            rate_limit.retain_recent();
        }
    });

    let app = router(state);

    if let Some(tls) = tls {
        serve_tls(app, &tls, shutdown_signal()).await?;
        info!("web_server_shutdown_complete");
        return Ok(());
    }

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Peer addresses feed the rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
