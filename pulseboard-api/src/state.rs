//! Shared application state for Axum routers.

use std::sync::Arc;

use axum::extract::FromRef;
use pulseboard_storage::Cache;

use crate::jobs::JobAdmissionQueue;
use crate::lifecycle::CoreServices;
use crate::rate_limit::RateLimiter;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub services: CoreServices,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(services: CoreServices) -> Self {
        Self {
            services,
            start_time: std::time::Instant::now(),
        }
    }
}

impl FromRef<AppState> for Arc<Cache> {
    fn from_ref(state: &AppState) -> Self {
        state.services.cache.clone()
    }
}

impl FromRef<AppState> for Arc<RateLimiter> {
    fn from_ref(state: &AppState) -> Self {
        state.services.rate_limiter.clone()
    }
}

impl FromRef<AppState> for Arc<JobAdmissionQueue> {
    fn from_ref(state: &AppState) -> Self {
        state.services.refresh_queue.clone()
    }
}
