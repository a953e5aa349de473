//! REST API Routes Module
//!
//! - `health`: liveness plus store connectivity
//! - `refresh`: stats-refresh admission
//!
//! Authentication handlers live outside this crate. They are passed to
//! [`create_api_router`] and are the only routes behind the lockout layer, so
//! a successful response elsewhere never clears a client's failure record.

pub mod health;
pub mod refresh;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::middleware::{auth_lockout_middleware, LockoutState};
use crate::state::AppState;

/// Build the API router.
///
/// `auth_routes` are wrapped in the auth lockout middleware (when enabled in
/// `config`) before being merged with the built-in routes.
pub fn create_api_router(
    state: AppState,
    config: &ApiConfig,
    auth_routes: Router<AppState>,
) -> Router {
    let lockout_state = LockoutState::new(state.services.rate_limiter.clone())
        .with_enabled(config.auth_lockout_enabled);

    let auth_routes = auth_routes.layer(middleware::from_fn_with_state(
        lockout_state,
        auth_lockout_middleware,
    ));

    Router::new()
        .route("/health", get(health::health))
        .route("/stats/refresh", post(refresh::request_refresh))
        .merge(auth_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
