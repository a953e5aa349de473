//! Key-value store primitives.
//!
//! [`KeyValueStore`] is the narrow surface the cache façade is built on: a
//! connection lifecycle plus get/set/delete/scan/list operations. Two
//! implementations ship with the crate:
//!
//! - [`RedisStore`]: a single multiplexed connection to a Redis-protocol server
//! - [`InMemoryStore`]: a TTL-aware map driven by an injectable clock
//!
//! # Key Prefixing
//!
//! Every method takes a *logical* key. Implementations materialize it as
//! `prefix + key` and strip the prefix again from scan results, so callers
//! never see or construct prefixed keys.
//!
//! # Failure Semantics
//!
//! Primitives never retry. A failed round-trip is reported immediately as a
//! [`StoreError`]; deciding whether to swallow it is the caller's job.
//! Restoring a lost connection is the store's job: [`RedisStore`] re-dials in
//! the background and flips back to `Connected` once the server answers.

pub mod glob;
pub mod memory;
pub mod redis_store;

use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use pulseboard_core::{StoreError, StoreResult};

pub use glob::{escape_glob, glob_match, KeyPattern};
pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// Observable connection state of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Atomically updated [`ConnectionState`].
///
/// Written only by the owning store; read by everyone else. The value is
/// eventually consistent with the socket: a dropped connection is noticed on
/// the next failed command, not the instant it happens.
#[derive(Debug)]
pub struct ConnectionStateCell(AtomicU8);

impl ConnectionStateCell {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Move from `current` to `next`; returns false if the state was different.
    pub fn transition(&self, current: ConnectionState, next: ConnectionState) -> bool {
        self.0
            .compare_exchange(
                current.as_u8(),
                next.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for ConnectionStateCell {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}

// ============================================================================
// KEY PREFIX
// ============================================================================

/// Maps logical keys to stored keys and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Materialize a logical key.
    pub fn apply(&self, key: &str) -> String {
        format!("{}{}", self.0, key)
    }

    /// Materialize a logical glob pattern. The prefix itself is escaped so
    /// glob characters inside it match literally.
    pub fn apply_pattern(&self, pattern: &str) -> String {
        format!("{}{}", escape_glob(&self.0), pattern)
    }

    /// Recover the logical key, or `None` for keys outside this prefix.
    pub fn strip<'a>(&self, stored: &'a str) -> Option<&'a str> {
        stored.strip_prefix(self.0.as_str())
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// One step of a cursor-based key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next call. `0` means the scan is complete.
    pub next_cursor: u64,
    /// Logical keys matched in this step. May be empty even mid-scan.
    pub keys: Vec<String>,
}

/// Connection-managed key-value store.
///
/// `ttl_secs == 0` on [`set`](Self::set) means the entry never expires.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Open the connection. No-op when already connected. Failure leaves the
    /// store disconnected and is returned to the caller.
    async fn connect(&self) -> StoreResult<()>;

    /// Close the connection. No-op when not connected.
    async fn destroy(&self) -> StoreResult<()>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Whether commands can currently be issued.
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Prefix applied to every logical key.
    fn key_prefix(&self) -> &str;

    /// Round-trip health check.
    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> StoreResult<()>;

    /// Returns true if the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Delete several keys in one round-trip; returns how many existed.
    async fn delete_many(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remaining time-to-live in seconds. `None` for absent or persistent keys.
    async fn ttl(&self, key: &str) -> StoreResult<Option<u64>>;

    /// One cursor step over logical keys matching a glob `pattern`.
    async fn scan_page(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// Append to the tail of a list; returns the new length.
    async fn list_push(&self, queue_key: &str, value: &[u8]) -> StoreResult<u64>;

    /// Inclusive range of a list. Negative indices count from the tail.
    async fn list_range(&self, queue_key: &str, start: i64, end: i64)
        -> StoreResult<Vec<Vec<u8>>>;
}

#[derive(Debug, Clone, Copy)]
enum ScanCursor {
    Start,
    At(u64),
    Done,
}

/// Lazily iterate all logical keys matching `pattern`, one batch per item.
///
/// The stream is finite and restartable per call. Between batches it yields
/// to the scheduler so long scans do not starve other tasks. A store error
/// ends the stream after being yielded once.
pub fn scan_keys<'a>(
    store: &'a dyn KeyValueStore,
    pattern: &'a str,
    batch_size: usize,
) -> impl Stream<Item = StoreResult<Vec<String>>> + Send + 'a {
    stream::unfold(ScanCursor::Start, move |cursor| async move {
        let position = match cursor {
            ScanCursor::Start => 0,
            ScanCursor::At(position) => {
                tokio::task::yield_now().await;
                position
            }
            ScanCursor::Done => return None,
        };

        match store.scan_page(position, pattern, batch_size.max(1)).await {
            Ok(page) => {
                let next = if page.next_cursor == 0 {
                    ScanCursor::Done
                } else {
                    ScanCursor::At(page.next_cursor)
                };
                Some((Ok(page.keys), next))
            }
            Err(e) => Some((Err(e), ScanCursor::Done)),
        }
    })
}

/// Guard used by implementations before issuing a command.
pub(crate) fn ensure_connected(state: &ConnectionStateCell) -> StoreResult<()> {
    if state.get() == ConnectionState::Connected {
        Ok(())
    } else {
        Err(StoreError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pulseboard_core::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_connection_state_cell_transitions() {
        let cell = ConnectionStateCell::default();
        assert_eq!(cell.get(), ConnectionState::Disconnected);

        assert!(cell.transition(ConnectionState::Disconnected, ConnectionState::Connecting));
        assert!(!cell.transition(ConnectionState::Disconnected, ConnectionState::Connecting));
        assert_eq!(cell.get(), ConnectionState::Connecting);

        cell.set(ConnectionState::Connected);
        assert_eq!(cell.get(), ConnectionState::Connected);
    }

    #[test]
    fn test_key_prefix_apply_and_strip() {
        let prefix = KeyPrefix::new("app:");
        assert_eq!(prefix.apply("user:1"), "app:user:1");
        assert_eq!(prefix.strip("app:user:1"), Some("user:1"));
        assert_eq!(prefix.strip("other:user:1"), None);
    }

    #[test]
    fn test_key_prefix_pattern_escapes_prefix() {
        let prefix = KeyPrefix::new("app*:");
        assert_eq!(prefix.apply_pattern("*"), "app\\*:*");
    }

    #[tokio::test]
    async fn test_scan_keys_visits_every_key_across_batches() {
        let store = InMemoryStore::new("scan:", Arc::new(ManualClock::starting_now()));
        store.connect().await.expect("connect");
        for i in 0..25 {
            store
                .set(&format!("k{}", i), b"v", 0)
                .await
                .expect("set");
        }

        let batches: Vec<_> = scan_keys(&store, "*", 4).collect().await;
        assert!(batches.len() > 1);

        let mut keys: Vec<String> = batches
            .into_iter()
            .flat_map(|batch| batch.expect("scan page"))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 25);
    }

    #[tokio::test]
    async fn test_scan_keys_stops_after_error() {
        let store = InMemoryStore::new("scan:", Arc::new(ManualClock::starting_now()));
        // Never connected: the first page fails and the stream ends.
        let batches: Vec<_> = scan_keys(&store, "*", 10).collect().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], Err(StoreError::NotConnected));
    }
}
