//! Pulseboard API - Auth Lockout, Job Admission and HTTP Surface
//!
//! This crate puts the storage core to work for the dashboard backend:
//! a sliding-window authentication-failure limiter, stats-refresh admission
//! with dedup, and the axum plumbing that exposes both.
//!
//! Everything here degrades with the key-value store. The limiter fails open,
//! cache reads miss, and only a refresh enqueue reports the outage.

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::{AdmissionError, JobAdmissionQueue};
pub use lifecycle::CoreServices;
pub use middleware::{auth_lockout_middleware, extract_client_ip, LockoutError, LockoutState};
pub use rate_limit::{failure_key, LockoutPolicy, RateLimiter};
pub use routes::create_api_router;
pub use state::AppState;
