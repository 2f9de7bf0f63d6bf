//! Per-client-IP rate limiting using the governor crate.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use tracing::warn;

use super::handlers::StatusResponse;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Shared per-IP limiter.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<KeyedLimiter>,
    trust_proxy_headers: bool,
}

impl RateLimit {
    /// Allow `per_minute` requests per client IP. Zero is treated as one.
    pub fn per_minute(per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN));

        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            trust_proxy_headers: false,
        }
    }

    /// Key on proxy headers. Only safe when every request arrives through a
    /// proxy that overwrites them.
    pub fn trusting_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Take one request from `ip`'s quota; `Err` carries the seconds to wait.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        self.limiter.check_key(&ip).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            wait.as_secs().max(1)
        })
    }

    /// Drop state for clients whose quota has fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

/// Resolve the client address.
///
/// With `trust_proxy_headers` the first `X-Forwarded-For` entry wins, then
/// `X-Real-IP`. Otherwise clients could pick their own key, so only the
/// socket peer counts.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> IpAddr {
    let peer_ip = peer.map(|addr| addr.ip());
    if !trust_proxy_headers {
        return peer_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    let forwarded: Option<IpAddr> = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };

    forwarded
        .or_else(real_ip)
        .or(peer_ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware rejecting clients over quota with 429.
pub async fn limit_by_ip(State(limit): State<RateLimit>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer, limit.trust_proxy_headers);

    if let Err(retry_after) = limit.check(ip) {
        warn!(
            client_ip = %ip,
            path = %req.uri().path(),
            retry_after_seconds = retry_after,
            "rate_limit_exceeded"
        );
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, retry_after.to_string())],
            Json(StatusResponse {
                status: "rate_limited",
            }),
        )
            .into_response();
    }

    next.run(req).await
}
