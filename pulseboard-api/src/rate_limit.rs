//! Authentication-failure rate limiter.
//!
//! Counts failed logins per client identifier in a sliding window anchored
//! at the first failure. A client whose count reaches the threshold is
//! blocked until its record expires, `LOCKOUT_SECONDS` after the last
//! failure.
//!
//! # Fail-open
//!
//! The limiter is defense in depth. Every method degrades to "not blocked"
//! when the store is unavailable, so a cache outage can never lock users out.
//!
//! # Concurrency
//!
//! `track_failure` is a read-modify-write over two store commands. Concurrent
//! failures for the same client may undercount by one; exact window reset
//! semantics are kept over race freedom.

use std::sync::Arc;
use std::time::Duration;

use pulseboard_core::{AuthFailureRecord, Clock};
use pulseboard_storage::Cache;

use crate::constants::{
    AUTH_FAILURE_KEY_PREFIX, FAILURE_THRESHOLD, LOCKOUT_SECONDS, WINDOW_SECONDS,
};

/// Thresholds governing when a client is locked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures within one window that block a client.
    pub failure_threshold: u32,
    /// Window length; a failure older than this starts a new window.
    pub window: Duration,
    /// TTL written with every failure record.
    pub lockout: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: FAILURE_THRESHOLD,
            window: Duration::from_secs(WINDOW_SECONDS),
            lockout: Duration::from_secs(LOCKOUT_SECONDS),
        }
    }
}

/// Per-client authentication failure tracker.
pub struct RateLimiter {
    cache: Arc<Cache>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

impl RateLimiter {
    pub fn new(cache: Arc<Cache>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache,
            clock,
            policy: LockoutPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LockoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Record one failed authentication attempt.
    pub async fn track_failure(&self, client_id: &str) {
        let key = failure_key(client_id);
        let now = self.clock.now();

        let record = match self.cache.get::<AuthFailureRecord>(&key).await {
            Some(existing) if existing.window_age(now) < self.policy.window => AuthFailureRecord {
                count: existing.count.saturating_add(1),
                first_failure: existing.first_failure,
            },
            _ => AuthFailureRecord::first(now),
        };

        self.cache
            .set(&key, &record, Some(self.policy.lockout.as_secs()))
            .await;

        if record.count >= self.policy.failure_threshold {
            tracing::warn!(
                client_id = %client_id,
                count = record.count,
                first_failure = %record.first_failure,
                "Authentication failure threshold reached"
            );
        } else {
            tracing::debug!(client_id = %client_id, count = record.count, "Authentication failure recorded");
        }
    }

    /// Whether the client has reached the failure threshold.
    pub async fn is_blocked(&self, client_id: &str) -> bool {
        self.failure_count(client_id).await >= self.policy.failure_threshold
    }

    /// Forget all failures for the client, e.g. after a successful login.
    pub async fn clear_failures(&self, client_id: &str) {
        if self.cache.delete(&failure_key(client_id)).await {
            tracing::debug!(client_id = %client_id, "Authentication failures cleared");
        }
    }

    /// Failures recorded in the current window; 0 when absent or on failure.
    pub async fn failure_count(&self, client_id: &str) -> u32 {
        self.cache
            .get::<AuthFailureRecord>(&failure_key(client_id))
            .await
            .map_or(0, |record| record.count)
    }

    /// Remaining lockout for a blocked client. `None` when the client is not
    /// blocked or the remaining time cannot be read.
    pub async fn retry_after(&self, client_id: &str) -> Option<Duration> {
        if !self.is_blocked(client_id).await {
            return None;
        }
        self.lockout_remaining(client_id).await
    }

    /// Time left on the client's failure record, without checking whether
    /// the client is blocked. For callers that already did.
    pub async fn lockout_remaining(&self, client_id: &str) -> Option<Duration> {
        self.cache.ttl_remaining(&failure_key(client_id)).await
    }
}

/// Logical key of a client's failure record.
pub fn failure_key(client_id: &str) -> String {
    format!("{}{}", AUTH_FAILURE_KEY_PREFIX, client_id)
}
