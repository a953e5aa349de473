//! Middleware modules for Pulseboard API
//!
//! - `lockout`: Blocks clients with too many failed authentications and
//!   feeds downstream 401 responses into the rate limiter
//!
//! # Middleware Order
//!
//! The lockout layer must wrap the authentication layer so it sees the final
//! status code of every login attempt:
//!
//! ```ignore
//! Router::new()
//!     .route("/auth/login", post(login))
//!     .layer(middleware::from_fn_with_state(auth_state, auth_middleware))
//!     .layer(middleware::from_fn_with_state(lockout_state, auth_lockout_middleware))
//! ```

mod lockout;

pub use lockout::{auth_lockout_middleware, extract_client_ip, LockoutError, LockoutState};
