//! HTTPS serving with certificates obtained on demand from Let's Encrypt.
//!
//! Challenges are answered over TLS-ALPN-01 on the HTTPS port itself, so no
//! plain HTTP listener is needed. Issued certificates and the account key
//! are cached in `TlsSettings::cache_dir` and reused across restarts.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use futures::StreamExt;
use rustls_acme::{caches::DirCache, AcmeConfig};
use tracing::{error, info};

use crate::config::TlsSettings;

/// Time in-flight requests get to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Serve `app` over HTTPS on `0.0.0.0:{settings.port}` until `shutdown`
/// resolves.
pub async fn serve_tls<F>(app: Router, settings: &TlsSettings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let mut state = AcmeConfig::new([settings.domain.clone()])
        .contact(settings.contact.iter().map(|c| format!("mailto:{c}")))
        .cache_option(Some(DirCache::new(settings.cache_dir.clone())))
        .directory_lets_encrypt(settings.production)
        .state();
    let acceptor = state.axum_acceptor(state.default_rustls_config());

    // Drives issuance and renewal for the life of the process
    tokio::spawn(async move {
        while let Some(event) = state.next().await {
            match event {
                Ok(ok) => info!(event = ?ok, "acme_event"),
                Err(e) => error!(error = %e, "acme_error"),
            }
        }
    });

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    info!(
        address = %addr,
        domain = %settings.domain,
        production = settings.production,
        "web_server_listening_tls"
    );

    axum_server::bind(addr)
        .handle(handle)
        .acceptor(acceptor)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("TLS server error")
}
