use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};
use tracing::{error, info, warn};

use storefront_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    // Payment provider
    let stripe = api::payments::StripeClient::from_config(&cfg)
        .context("payment provider unavailable; set APP__STRIPE_SECRET_KEY")?;
    let payments: Arc<dyn api::payments::PaymentProvider> = Arc::new(stripe);

    // Compose shared app state
    let app_state = api::AppState::new(Arc::new(db_pool), cfg.clone(), payments);

    // Build CORS layer from config
    let cors_layer = api::middleware_helpers::build_cors_layer(&cfg).map_err(|e| {
        error!("{}", e);
        e
    })?;

    let app = api::app_router(app_state)
        // Apply compression and timeouts
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(cfg.request_timeout()))
        // Apply CORS
        .layer(cors_layer);

    // Bind and serve
    let ip = cfg.host.parse().unwrap_or_else(|_| {
        warn!(host = %cfg.host, "invalid host, binding to 0.0.0.0");
        std::net::IpAddr::from([0, 0, 0, 0])
    });
    let addr = SocketAddr::new(ip, cfg.port);
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("storefront-api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
