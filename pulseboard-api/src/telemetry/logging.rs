//! Tracing Subscriber Initialization

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "pulseboard_api=debug,pulseboard_storage=info,info";

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Service version
    pub service_version: String,
    /// Environment (production, staging, development)
    pub environment: String,
    /// Emit JSON lines instead of human-readable output
    pub log_json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "pulseboard-api".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            log_json: true,
        }
    }
}

impl TelemetryConfig {
    /// Environment variables:
    /// - `PULSEBOARD_SERVICE_NAME` (default: pulseboard-api)
    /// - `PULSEBOARD_SERVICE_VERSION` (default: crate version)
    /// - `PULSEBOARD_ENVIRONMENT` (default: development)
    /// - `PULSEBOARD_LOG_JSON`: "true"/"1" or "false"/"0" (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("PULSEBOARD_SERVICE_NAME")
                .unwrap_or(defaults.service_name),
            service_version: std::env::var("PULSEBOARD_SERVICE_VERSION")
                .unwrap_or(defaults.service_version),
            environment: std::env::var("PULSEBOARD_ENVIRONMENT").unwrap_or(defaults.environment),
            log_json: std::env::var("PULSEBOARD_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.log_json),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup before any tracing occurs. A second call fails
/// because a global subscriber is already set.
pub fn init_logging(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json_layer = config
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!config.log_json).then(|| tracing_subscriber::fmt::layer());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        environment = config.environment,
        "Logging initialized"
    );

    Ok(())
}
