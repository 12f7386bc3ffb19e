//! Router configuration module
//!
//! Builds the application router: the verification API, the health probes,
//! the OpenAPI document and the middleware stack.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, Method, StatusCode},
    routing::{get, post},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::handlers::{health, ready, verify_device_handler};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Create the application router with default config and memory storage (for testing)
pub fn create_router() -> Router {
    let config = Config::default();
    let state = AppState::in_memory(&config);
    create_router_with_state(&config, state)
}

/// Create the application router with custom configuration and state
pub fn create_router_with_state(config: &Config, state: AppState) -> Router {
    let mut api = Router::new().route("/device/verify", post(verify_device_handler));

    // Probes stay outside the limiter so orchestrators can always reach them
    if config.rate_limit_enabled {
        let governor_conf = GovernorConfigBuilder::default()
            .per_second(config.rate_limit_per_sec)
            .burst_size(config.rate_limit_burst)
            .finish()
            .expect("Failed to build rate limiter config");
        tracing::info!(
            per_sec = config.rate_limit_per_sec,
            burst = config.rate_limit_burst,
            "Rate limiting /device/verify"
        );
        api = api.layer(GovernorLayer::new(Arc::new(governor_conf)));
    } else {
        tracing::warn!("Rate limiting: DISABLED");
    }

    api.route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(config))
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.timeout_secs),
        ))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<_> = config
        .allowed_origins
        .iter()
        .flatten()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS: Allowing all origins (dev mode)");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    tracing::info!(origins = origins.len(), "CORS: Restricting origins");
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}
