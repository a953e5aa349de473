//! Pulseboard API Server Entry Point
//!
//! Bootstraps configuration, connects the storage core and starts the Axum
//! HTTP server.

use std::net::SocketAddr;

use axum::Router;
use pulseboard_api::telemetry::{init_logging, TelemetryConfig};
use pulseboard_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState, CoreServices};
use pulseboard_core::StoreConfig;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env();
    init_logging(&telemetry_config)?;

    let store_config = StoreConfig::from_env();
    let api_config = ApiConfig::from_env();

    let services = CoreServices::init(&store_config, &api_config).await?;
    let state = AppState::new(services.clone());

    let app = create_api_router(state, &api_config, Router::new())
        .into_make_service_with_connect_info::<SocketAddr>();

    let addr = api_config.bind_addr()?;
    tracing::info!(%addr, store = %store_config.display_target(), "Starting Pulseboard API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    services.shutdown().await;
    Ok(())
}
