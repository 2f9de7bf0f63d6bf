//! Router-level tests for health, lookup, CORS and rate limiting.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use common::{
    app_for, body_json, config_with, signed_request, test_app, test_app_with, RecordingNotifier,
    SECRET,
};

fn lookup_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/lookup")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let app = test_app(Arc::new(RecordingNotifier::default()));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn lookup_returns_record() {
    let app = test_app(Arc::new(RecordingNotifier::default()));

    let response = app.oneshot(lookup_request(r#"{"id":"u1"}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "Ada");
}

#[tokio::test]
async fn lookup_unknown_id_is_not_found() {
    let app = test_app(Arc::new(RecordingNotifier::default()));

    let response = app.oneshot(lookup_request(r#"{"id":"nobody"}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["status"], "not_found");
}

#[tokio::test]
async fn lookup_malformed_body_is_client_error() {
    let app = test_app(Arc::new(RecordingNotifier::default()));

    let response = app.oneshot(lookup_request("{oops")).await.unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn lookup_preflight_allows_client_origin() {
    let app = test_app(Arc::new(RecordingNotifier::default()));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/lookup")
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://app.example.com"
    );
}

#[tokio::test]
async fn lookup_preflight_ignores_other_origins() {
    let app = test_app(Arc::new(RecordingNotifier::default()));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/lookup")
        .header("origin", "https://evil.example.net")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());
}

#[tokio::test]
async fn plain_options_succeeds() {
    let app = test_app(Arc::new(RecordingNotifier::default()));

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/lookup")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_success());
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    let app = test_app_with(Arc::new(RecordingNotifier::default()), 2);

    let from = |ip: &str| {
        let mut request = lookup_request(r#"{"id":"u1"}"#);
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    };

    for _ in 0..2 {
        let response = app.clone().oneshot(from("198.51.100.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(from("198.51.100.1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    // Another client is unaffected
    let response = app.clone().oneshot(from("198.51.100.2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_ignores_forwarded_for_unless_trusted() {
    let app = app_for(
        config_with(&[("RATE_LIMIT_PER_MINUTE", "2")]),
        Arc::new(RecordingNotifier::default()),
    );
    let peer: SocketAddr = "192.0.2.10:51000".parse().unwrap();

    let rotating = |n: u8| {
        let mut request = lookup_request(r#"{"id":"u1"}"#);
        request
            .headers_mut()
            .insert("x-forwarded-for", format!("198.51.100.{n}").parse().unwrap());
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    };

    for n in 1..=2 {
        let response = app.clone().oneshot(rotating(n)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // A fresh header value does not buy a fresh quota
    let response = app.clone().oneshot(rotating(3)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn rate_limit_covers_webhook_but_not_health() {
    let app = test_app_with(Arc::new(RecordingNotifier::default()), 1);

    let payload = br#"{"type":"charge.refunded"}"#;
    let response = app
        .clone()
        .oneshot(signed_request(payload, SECRET))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(signed_request(payload, SECRET))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    for _ in 0..3 {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
