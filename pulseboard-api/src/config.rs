//! API Configuration Module
//!
//! Server binding, auth lockout toggle and the startup policy for an
//! unreachable key-value store. Loaded from environment variables with
//! defaults suitable for development.

use crate::constants::{DEFAULT_API_BIND, DEFAULT_API_PORT};
use crate::error::{ApiError, ApiResult};
use std::net::SocketAddr;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Host to bind the HTTP listener to.
    pub bind_host: String,

    /// Port to bind the HTTP listener to.
    pub port: u16,

    /// Whether the auth-failure lockout middleware is active.
    pub auth_lockout_enabled: bool,

    /// Abort startup when the key-value store cannot be reached.
    /// When false the server starts degraded: cache reads miss, the lockout
    /// fails open and refresh requests are refused.
    pub require_cache: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_API_BIND.to_string(),
            port: DEFAULT_API_PORT,
            auth_lockout_enabled: true,
            require_cache: false,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PULSEBOARD_API_BIND`: Bind host (default: 0.0.0.0)
    /// - `PORT` or `PULSEBOARD_API_PORT`: Listen port (default: 3000)
    /// - `PULSEBOARD_AUTH_LOCKOUT_ENABLED`: "true" or "false" (default: true)
    /// - `PULSEBOARD_REQUIRE_CACHE`: "true" or "false" (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_host = std::env::var("PULSEBOARD_API_BIND").unwrap_or(defaults.bind_host);

        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("PULSEBOARD_API_PORT").ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let auth_lockout_enabled = std::env::var("PULSEBOARD_AUTH_LOCKOUT_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.auth_lockout_enabled);

        let require_cache = std::env::var("PULSEBOARD_REQUIRE_CACHE")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.require_cache);

        Self {
            bind_host,
            port,
            auth_lockout_enabled,
            require_cache,
        }
    }

    /// Resolve the socket address to listen on.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert!(config.auth_lockout_enabled);
        assert!(!config.require_cache);
    }

    #[test]
    fn test_bind_addr() -> Result<(), String> {
        let config = ApiConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        let addr = config.bind_addr().map_err(|e| e.message)?;
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
        Ok(())
    }

    #[test]
    fn test_bind_addr_rejects_bad_host() {
        let config = ApiConfig {
            bind_host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(config.bind_addr().is_err());
    }
}
