use axum::http::{
    header::{self, HeaderName},
    HeaderValue, Method,
};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

use crate::{config::AppConfig, tracing::REQUEST_ID_HEADER};

#[derive(Debug, Error)]
pub enum CorsConfigError {
    #[error(
        "Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true"
    )]
    MissingOrigins,
}

const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

fn allowed_headers() -> [HeaderName; 4] {
    [
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        HeaderName::from_static(REQUEST_ID_HEADER),
    ]
}

fn configured_origins(cfg: &AppConfig) -> Option<Vec<HeaderValue>> {
    cfg.cors_allowed_origins
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty())
}

/// Builds the CORS layer from configuration.
///
/// Credentialed CORS forbids wildcards, so with credentials enabled the
/// methods and headers are listed explicitly and the permissive fallback
/// mirrors the request origin instead of answering `*`.
pub fn build_cors_layer(cfg: &AppConfig) -> Result<CorsLayer, CorsConfigError> {
    let credentials = cfg.cors_allow_credentials;

    let origin = if let Some(origins) = configured_origins(cfg) {
        AllowOrigin::list(origins)
    } else if cfg.should_allow_permissive_cors() {
        info!(
            credentials,
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        if !credentials {
            return Ok(CorsLayer::permissive());
        }
        AllowOrigin::mirror_request()
    } else {
        return Err(CorsConfigError::MissingOrigins);
    };

    let layer = CorsLayer::new().allow_origin(origin);
    Ok(if credentials {
        layer
            .allow_methods(ALLOWED_METHODS.to_vec())
            .allow_headers(allowed_headers().to_vec())
            .allow_credentials(true)
    } else {
        layer.allow_methods(Any).allow_headers(Any)
    })
}
