//! Pulseboard Core - Shared Types
//!
//! Data shapes persisted in the key-value store, the error taxonomy, store
//! configuration and the clock abstraction. Every other crate depends on this.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StoreConfig;
pub use error::{ConfigError, PulseError, PulseResult, StoreError, StoreResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// AUTH FAILURE TRACKING
// ============================================================================

/// Failed authentication attempts observed for one client identifier.
///
/// Stored as JSON under `auth-failure:<client_id>`. The record carries no
/// explicit state; "blocked" is derived by comparing `count` against the
/// limiter threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFailureRecord {
    /// Failures observed within the current window. Always >= 1.
    pub count: u32,
    /// Start of the current window.
    pub first_failure: Timestamp,
}

impl AuthFailureRecord {
    /// Open a new window with a single failure.
    pub fn first(now: Timestamp) -> Self {
        Self {
            count: 1,
            first_failure: now,
        }
    }

    /// Time elapsed since the window opened. Negative ages clamp to zero.
    pub fn window_age(&self, now: Timestamp) -> std::time::Duration {
        now.signed_duration_since(self.first_failure)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

// ============================================================================
// JOB ADMISSION
// ============================================================================

/// A pending stats-refresh job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Subject whose statistics should be recomputed.
    pub user_id: String,
    /// When the refresh was requested.
    pub requested_at: Timestamp,
    /// How many times the worker has retried this job.
    pub retry_count: u32,
}

impl QueueEntry {
    /// Create a fresh entry that has never been retried.
    pub fn new(user_id: impl Into<String>, requested_at: Timestamp) -> Self {
        Self {
            user_id: user_id.into(),
            requested_at,
            retry_count: 0,
        }
    }
}

/// Result of asking for a stats refresh.
///
/// Serialized with a snake_case `status` tag and camelCase fields, e.g.
/// `{"status":"rejected_up_to_date","lastUpdatedAt":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RefreshOutcome {
    /// The job was appended to the main queue.
    Admitted,
    /// Statistics were refreshed recently enough; nothing was queued.
    RejectedUpToDate { last_updated_at: Timestamp },
    /// A worker is already processing this subject.
    RejectedInProgress,
}

impl RefreshOutcome {
    /// Returns true if the job was queued.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}
