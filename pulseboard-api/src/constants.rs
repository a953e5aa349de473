//! Constants for Pulseboard API
//!
//! Lockout policy, refresh cadence and queue names. Centralizing them keeps
//! the persisted key layout in one place.

// ============================================================================
// AUTH FAILURE LOCKOUT
// ============================================================================

/// Failures within one window after which a client is blocked.
pub const FAILURE_THRESHOLD: u32 = 5;

/// Length of the failure-counting window in seconds (5 minutes).
pub const WINDOW_SECONDS: u64 = 300;

/// Lifetime of a failure record after its last write in seconds (15 minutes).
pub const LOCKOUT_SECONDS: u64 = 900;

/// Logical key prefix of failure records: `auth-failure:<client_id>`.
pub const AUTH_FAILURE_KEY_PREFIX: &str = "auth-failure:";

// ============================================================================
// STATS REFRESH
// ============================================================================

/// Minimum age of statistics before a refresh is admitted (15 minutes).
pub const REFRESH_INTERVAL_SECS: u64 = 900;

/// Logical key prefix shared by all job queues.
pub const QUEUE_KEY_PREFIX: &str = "queue:";

/// Name of the stats-refresh queue.
pub const STATS_REFRESH_QUEUE: &str = "stats-refresh";

/// Suffix of the list holding jobs a worker has picked up.
pub const PROCESSING_SUFFIX: &str = ":processing";

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host.
pub const DEFAULT_API_BIND: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_API_PORT: u16 = 3000;
