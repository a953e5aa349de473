//! Auth-failure lockout middleware.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::constants::LOCKOUT_SECONDS;
use crate::error::ApiError;
use crate::rate_limit::RateLimiter;

// ============================================================================
// STATE
// ============================================================================

/// State for the lockout middleware.
#[derive(Clone)]
pub struct LockoutState {
    pub limiter: Arc<RateLimiter>,
    pub enabled: bool,
}

impl LockoutState {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

// ============================================================================
// ERROR
// ============================================================================

/// Rejection for a locked-out client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutError {
    /// Seconds until the failure record expires
    pub retry_after: u64,
}

impl IntoResponse for LockoutError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(Some(self.retry_after));

        let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(error)).into_response();
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("900")),
        );

        response
    }
}

// ============================================================================
// CLIENT IDENTIFICATION
// ============================================================================

/// Extract client IP from request, considering proxy headers.
///
/// Order: first entry of X-Forwarded-For, then X-Real-IP, then the socket
/// address. `None` when none of them yields an address.
pub fn extract_client_ip(request: &Request, fallback: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(forwarded_for) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first_ip) = forwarded_for.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse() {
                return Some(ip);
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
    {
        if let Ok(ip) = real_ip.trim().parse() {
            return Some(ip);
        }
    }

    fallback.map(|addr| addr.ip())
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Auth lockout middleware.
///
/// Rejects blocked clients with 429 and a Retry-After header before the
/// request reaches authentication. Afterwards a 401 response counts as a
/// failure and any 2xx response clears the client's record. Requests whose
/// client cannot be identified pass through untracked.
pub async fn auth_lockout_middleware(
    State(state): State<LockoutState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, LockoutError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    let Some(client_ip) = extract_client_ip(&request, connect_info.map(|ConnectInfo(addr)| addr))
    else {
        tracing::debug!("No client address available, skipping auth lockout");
        return Ok(next.run(request).await);
    };
    let client_id = client_ip.to_string();

    if state.limiter.is_blocked(&client_id).await {
        let retry_after = state
            .limiter
            .lockout_remaining(&client_id)
            .await
            .map(|remaining| remaining.as_secs())
            .unwrap_or(LOCKOUT_SECONDS)
            .max(1);

        tracing::info!(client_id = %client_id, retry_after, "Rejected locked-out client");
        return Err(LockoutError { retry_after });
    }

    let response = next.run(request).await;
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED {
        state.limiter.track_failure(&client_id).await;
    } else if status.is_success() {
        state.limiter.clear_failures(&client_id).await;
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(headers: &[(&str, &str)]) -> Request {
        let mut builder = axum::http::Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        let request = request_with(&[("x-forwarded-for", "10.0.0.5, 172.16.0.1")]);
        assert_eq!(
            extract_client_ip(&request, None),
            Some("10.0.0.5".parse().unwrap())
        );
    }

    #[test]
    fn test_real_ip_used_when_forwarded_for_invalid() {
        let request = request_with(&[("x-forwarded-for", "garbage"), ("x-real-ip", "10.0.0.7")]);
        assert_eq!(
            extract_client_ip(&request, None),
            Some("10.0.0.7".parse().unwrap())
        );
    }

    #[test]
    fn test_falls_back_to_socket_address() {
        let request = request_with(&[]);
        let addr: SocketAddr = "192.168.1.9:51234".parse().unwrap();
        assert_eq!(extract_client_ip(&request, Some(addr)), Some(addr.ip()));
        assert_eq!(extract_client_ip(&request, None), None);
    }

    #[test]
    fn test_lockout_error_sets_retry_after() {
        let response = LockoutError { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("retry-after").and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }
}
