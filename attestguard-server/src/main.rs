//! AttestGuard Server - REST API for device attestation verification
//!
//! Exposes attestguard-core via HTTP endpoints:
//! - POST /device/verify - Verify an attestation, assertion or device token
//! - GET /health, GET /ready - Liveness and readiness
//! - GET /docs - Swagger UI

use std::net::SocketAddr;

use attestguard_server::{create_router_with_state, store, AppState, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("attestguard_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let anchor = config.load_trust_anchor()?;
    let store = store::connect(&config).await?;
    let mut state = AppState::new(&config, store);
    match anchor {
        Some(anchor) => state = state.with_trust_anchor(anchor),
        None => tracing::info!("Using embedded App Attestation root as trust anchor"),
    }
    let app = create_router_with_state(&config, state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "AttestGuard server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
