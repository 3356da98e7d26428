//! Storefront API Library
//!
//! Catalog, per-user carts, threshold coupons and hosted checkout with
//! idempotent order reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod payments;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Extension, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<auth::AuthService>,
}

impl AppState {
    /// Builds the service graph for one pool and payment provider.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        payments: Arc<dyn payments::PaymentProvider>,
    ) -> Self {
        let auth = Arc::new(auth::AuthService::new(auth::AuthConfig::from(&config)));
        let services = handlers::AppServices::new(db.clone(), payments, &config);
        Self {
            db,
            config,
            services,
            auth,
        }
    }
}

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .nest("/products", handlers::commerce::products_routes())
        .nest("/cart", handlers::commerce::cart_routes())
        .nest("/coupons", handlers::commerce::coupon_routes())
        .nest("/payments", handlers::commerce::payments_routes())
}

/// Full application router: v1 API, Swagger UI, request ids and tracing.
///
/// Transport concerns that depend on deployment (CORS, compression,
/// timeouts) are layered on by the binary.
pub fn app_router(state: AppState) -> Router {
    let auth_service = state.auth.clone();

    Router::<AppState>::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Auth middleware looks the service up in request extensions
        .layer(Extension(auth_service))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "storefront-api",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "build_time": option_env!("BUILD_TIME").unwrap_or("unknown"),
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health_check(State(state): State<AppState>) -> (axum::http::StatusCode, Json<Value>) {
    let healthy = db::check_connection(&state.db).await.is_ok();
    let status = if healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "checks": { "database": if healthy { "healthy" } else { "unhealthy" } },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}
