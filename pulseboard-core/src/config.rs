//! Key-value store configuration
//!
//! Loaded from environment variables with defaults suitable for a local
//! Redis instance.

use std::time::Duration;

use crate::error::ConfigError;

/// Default key prefix applied to every logical key.
pub const DEFAULT_KEY_PREFIX: &str = "pulseboard:";

/// Default cache entry TTL in seconds (1 hour).
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default number of keys requested per SCAN step.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 100;

/// Connection and keyspace settings for the key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store hostname.
    pub host: String,
    /// Store port.
    pub port: u16,
    /// Optional AUTH password.
    pub password: Option<String>,
    /// Optional logical database index.
    pub db: Option<i64>,
    /// Prefix prepended to every logical key.
    pub key_prefix: String,
    /// TTL used by `Cache::set` when the caller does not pass one. 0 disables expiry.
    pub default_ttl_secs: u64,
    /// Keys requested per SCAN step during `clear` and `size`.
    pub scan_batch_size: usize,
    /// Upper bound on establishing a connection.
    pub connect_timeout: Duration,
    /// First delay before re-dialing a lost connection. Doubles per attempt.
    pub reconnect_initial_delay: Duration,
    /// Ceiling for the re-dial delay.
    pub reconnect_max_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            connect_timeout: Duration::from_secs(5),
            reconnect_initial_delay: Duration::from_millis(100),
            reconnect_max_delay: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Create StoreConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PULSEBOARD_REDIS_HOST`: Hostname (default: 127.0.0.1)
    /// - `PULSEBOARD_REDIS_PORT`: Port (default: 6379)
    /// - `PULSEBOARD_REDIS_PASSWORD`: Password (default: none)
    /// - `PULSEBOARD_REDIS_DB`: Database index (default: none)
    /// - `PULSEBOARD_CACHE_PREFIX`: Key prefix (default: "pulseboard:")
    /// - `PULSEBOARD_CACHE_DEFAULT_TTL`: Default TTL in seconds (default: 3600)
    /// - `PULSEBOARD_SCAN_BATCH_SIZE`: Keys per SCAN step (default: 100)
    /// - `PULSEBOARD_REDIS_CONNECT_TIMEOUT_SECS`: Connect timeout (default: 5)
    /// - `PULSEBOARD_REDIS_RECONNECT_MAX_MS`: Re-dial delay ceiling (default: 5000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("PULSEBOARD_REDIS_HOST").unwrap_or(defaults.host);

        let port = std::env::var("PULSEBOARD_REDIS_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let password = std::env::var("PULSEBOARD_REDIS_PASSWORD")
            .ok()
            .filter(|s| !s.is_empty());

        let db = std::env::var("PULSEBOARD_REDIS_DB")
            .ok()
            .and_then(|s| s.parse().ok());

        let key_prefix =
            std::env::var("PULSEBOARD_CACHE_PREFIX").unwrap_or(defaults.key_prefix);

        let default_ttl_secs = std::env::var("PULSEBOARD_CACHE_DEFAULT_TTL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.default_ttl_secs);

        let scan_batch_size = std::env::var("PULSEBOARD_SCAN_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.scan_batch_size);

        let connect_timeout = std::env::var("PULSEBOARD_REDIS_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.connect_timeout);

        let reconnect_max_delay = std::env::var("PULSEBOARD_REDIS_RECONNECT_MAX_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.reconnect_max_delay);

        Self {
            host,
            port,
            password,
            db,
            key_prefix,
            default_ttl_secs,
            scan_batch_size,
            connect_timeout,
            reconnect_initial_delay: defaults.reconnect_initial_delay,
            reconnect_max_delay,
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the default TTL.
    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    /// Set the SCAN batch size.
    pub fn with_scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size;
        self
    }

    /// Set the re-dial backoff bounds.
    pub fn with_reconnect_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_initial_delay = initial;
        self.reconnect_max_delay = max;
        self
    }

    /// Reject settings the store cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "host".to_string(),
            });
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: self.port.to_string(),
                reason: "must be non-zero".to_string(),
            });
        }
        if self.key_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "key_prefix".to_string(),
                value: String::new(),
                reason: "an empty prefix would let clear() touch foreign keys".to_string(),
            });
        }
        if self.scan_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan_batch_size".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.reconnect_initial_delay.is_zero()
            || self.reconnect_initial_delay > self.reconnect_max_delay
        {
            return Err(ConfigError::InvalidValue {
                field: "reconnect_initial_delay".to_string(),
                value: format!("{:?}", self.reconnect_initial_delay),
                reason: "must be non-zero and not above reconnect_max_delay".to_string(),
            });
        }
        Ok(())
    }

    /// Render the `redis://` connection URL. The password is percent-encoded.
    pub fn connection_url(&self) -> String {
        let auth = match &self.password {
            Some(password) => format!(":{}@", urlencoding::encode(password)),
            None => String::new(),
        };
        let db = self.db.map(|db| format!("/{}", db)).unwrap_or_default();
        format!("redis://{}{}:{}{}", auth, self.host, self.port, db)
    }

    /// Host and port without credentials, safe to log.
    pub fn display_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
