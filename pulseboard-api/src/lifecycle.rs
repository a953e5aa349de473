//! Service wiring and lifecycle.
//!
//! `CoreServices` builds the storage stack in dependency order (store, cache,
//! rate limiter, admission queue) and tears the connection down on shutdown.
//! There is no process-wide instance; the binary owns one and hands clones of
//! its `Arc`s to the router.

use std::sync::Arc;

use pulseboard_core::{Clock, PulseResult, StoreConfig, SystemClock};
use pulseboard_storage::{Cache, CacheConfig, KeyValueStore, RedisStore};

use crate::config::ApiConfig;
use crate::jobs::JobAdmissionQueue;
use crate::rate_limit::RateLimiter;

/// The storage core and its consumers.
#[derive(Clone)]
pub struct CoreServices {
    pub store: Arc<dyn KeyValueStore>,
    pub cache: Arc<Cache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub refresh_queue: Arc<JobAdmissionQueue>,
    pub clock: Arc<dyn Clock>,
}

impl CoreServices {
    /// Connect to the configured store and wire everything on top of it.
    ///
    /// Returns an error for an invalid configuration, or for an unreachable
    /// store when `api_config.require_cache` is set. Otherwise an unreachable
    /// store leaves the services running degraded.
    pub async fn init(store_config: &StoreConfig, api_config: &ApiConfig) -> PulseResult<Self> {
        store_config.validate()?;

        let store: Arc<dyn KeyValueStore> = Arc::new(RedisStore::new(store_config.clone()));
        Self::with_store(
            store,
            CacheConfig::from(store_config),
            Arc::new(SystemClock),
            api_config.require_cache,
        )
        .await
    }

    /// Wire services over an existing store, connecting it first.
    pub async fn with_store(
        store: Arc<dyn KeyValueStore>,
        cache_config: CacheConfig,
        clock: Arc<dyn Clock>,
        require_cache: bool,
    ) -> PulseResult<Self> {
        if let Err(e) = store.connect().await {
            if require_cache {
                tracing::error!(error = %e, "Key-value store unreachable, aborting startup");
                // Stop any background re-dial before giving up on the store.
                let _ = store.destroy().await;
                return Err(e.into());
            }
            tracing::warn!(
                error = %e,
                "Key-value store unreachable, continuing without cache until it reconnects"
            );
        }

        let cache = Arc::new(Cache::new(store.clone(), cache_config));
        let rate_limiter = Arc::new(RateLimiter::new(cache.clone(), clock.clone()));
        let refresh_queue = Arc::new(JobAdmissionQueue::new(cache.clone(), clock.clone()));

        Ok(Self {
            store,
            cache,
            rate_limiter,
            refresh_queue,
            clock,
        })
    }

    /// Close the store connection. Errors are logged, not returned.
    pub async fn shutdown(&self) {
        match self.store.destroy().await {
            Ok(()) => tracing::info!("Key-value store connection closed"),
            Err(e) => tracing::warn!(error = %e, "Failed to close key-value store connection"),
        }
    }
}
