//! Cross-cutting HTTP behavior: authentication, request ids, error bodies,
//! health probes and the OpenAPI document.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{response_json, TestApp};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn health_and_status_are_public() {
    let app = TestApp::new().await;

    let (status, body) = app.json(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"], "healthy");

    let (status, body) = app.json(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "storefront-api");
    assert_eq!(body["environment"], "test");
}

#[tokio::test]
async fn protected_routes_reject_missing_and_invalid_tokens() {
    let app = TestApp::new().await;

    for uri in ["/api/v1/cart", "/api/v1/coupons"] {
        let (status, body) = app.json(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["message"], "Unauthorized - No access token provided");
    }

    let (status, body) = app
        .json(Method::GET, "/api/v1/cart", None, Some("not.a.jwt"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Unauthorized - Invalid access token");
}

#[tokio::test]
async fn tokens_signed_with_another_secret_are_rejected() {
    let app = TestApp::new().await;
    let mut config = app.state.config.clone();
    config.jwt_secret = "a_completely_different_secret_of_enough_length".to_string();
    let foreign = storefront_api::auth::AuthService::new((&config).into())
        .issue_token(Uuid::new_v4(), None, vec![], Duration::from_secs(600))
        .unwrap();

    let (status, _) = app
        .json(Method::GET, "/api/v1/cart", None, Some(&foreign))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_cookie_authenticates() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/v1/cart")
        .header("cookie", format!("theme=dark; accessToken={}", app.token()))
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await, json!([]));
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .uri("/api/v1/health")
        .header("x-request-id", "req-from-client-42")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.headers()["x-request-id"], "req-from-client-42");

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(Uuid::parse_str(generated).is_ok());
}

#[tokio::test]
async fn error_bodies_carry_the_request_id() {
    let app = TestApp::new().await;

    let request = Request::builder()
        .uri("/api/v1/cart")
        .header("x-request-id", "req-unauthorized")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["request_id"], "req-unauthorized");

    let request = Request::builder()
        .method(Method::GET)
        .uri(format!("/api/v1/products/{}", Uuid::new_v4()))
        .header("x-request-id", "req-missing-product")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["request_id"], "req-missing-product");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let (status, doc) = app
        .json(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    for path in [
        "/api/v1/products",
        "/api/v1/cart",
        "/api/v1/coupons/auto-generate",
        "/api/v1/payments/checkout-success",
    ] {
        assert!(doc["paths"].get(path).is_some(), "missing {}", path);
    }
}
