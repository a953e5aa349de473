//! Pulseboard Test Utilities
//!
//! Shared test infrastructure for the Pulseboard workspace:
//! - A store double that fails every command
//! - A store wrapper that records the commands issued through it
//! - Proptest generators for the persisted data shapes
//! - Fixtures wiring stores, caches and clocks together

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub use pulseboard_core::{
    AuthFailureRecord, Clock, ManualClock, QueueEntry, RefreshOutcome, StoreConfig, StoreError,
    StoreResult, SystemClock, Timestamp,
};
pub use pulseboard_storage::{
    Cache, CacheConfig, ConnectionState, InMemoryStore, KeyValueStore, ScanPage,
};

use async_trait::async_trait;
use chrono::Utc;

// ============================================================================
// STORE DOUBLES
// ============================================================================

/// Store that reports itself connected but fails every command.
///
/// Models a server that accepted the connection and then went away, which
/// is the case fail-soft and fail-open code has to survive.
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commands attempted against this store.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self, command: &str) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::command(command, "connection reset by peer"))
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn connect(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::ConnectionFailed {
            target: "failing-store".to_string(),
            reason: "connection refused".to_string(),
        })
    }

    async fn destroy(&self) -> StoreResult<()> {
        self.fail("QUIT")
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    fn key_prefix(&self) -> &str {
        "failing:"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.fail("PING")
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.fail("GET")
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl_secs: u64) -> StoreResult<()> {
        self.fail("SET")
    }

    async fn delete(&self, _key: &str) -> StoreResult<bool> {
        self.fail("DEL")
    }

    async fn delete_many(&self, _keys: &[String]) -> StoreResult<u64> {
        self.fail("DEL")
    }

    async fn exists(&self, _key: &str) -> StoreResult<bool> {
        self.fail("EXISTS")
    }

    async fn ttl(&self, _key: &str) -> StoreResult<Option<u64>> {
        self.fail("TTL")
    }

    async fn scan_page(
        &self,
        _cursor: u64,
        _pattern: &str,
        _count: usize,
    ) -> StoreResult<ScanPage> {
        self.fail("SCAN")
    }

    async fn list_push(&self, _queue_key: &str, _value: &[u8]) -> StoreResult<u64> {
        self.fail("RPUSH")
    }

    async fn list_range(
        &self,
        _queue_key: &str,
        _start: i64,
        _end: i64,
    ) -> StoreResult<Vec<Vec<u8>>> {
        self.fail("LRANGE")
    }
}

/// Wrapper that records every command before delegating to `inner`.
pub struct CountingStore {
    inner: Arc<dyn KeyValueStore>,
    commands: Mutex<Vec<&'static str>>,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Commands issued since construction or the last `reset`, in order.
    pub fn commands(&self) -> Vec<&'static str> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// How many times `command` was issued.
    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| **c == command).count()
    }

    pub fn reset(&self) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.clear();
        }
    }

    fn record(&self, command: &'static str) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn connect(&self) -> StoreResult<()> {
        self.inner.connect().await
    }

    async fn destroy(&self) -> StoreResult<()> {
        self.inner.destroy().await
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    fn key_prefix(&self) -> &str {
        self.inner.key_prefix()
    }

    async fn ping(&self) -> StoreResult<()> {
        self.record("PING");
        self.inner.ping().await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.record("GET");
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> StoreResult<()> {
        self.record("SET");
        self.inner.set(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.record("DEL");
        self.inner.delete(key).await
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<u64> {
        self.record("DEL");
        self.inner.delete_many(keys).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.record("EXISTS");
        self.inner.exists(key).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        self.record("TTL");
        self.inner.ttl(key).await
    }

    async fn scan_page(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        self.record("SCAN");
        self.inner.scan_page(cursor, pattern, count).await
    }

    async fn list_push(&self, queue_key: &str, value: &[u8]) -> StoreResult<u64> {
        self.record("RPUSH");
        self.inner.list_push(queue_key, value).await
    }

    async fn list_range(
        &self,
        queue_key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<Vec<u8>>> {
        self.record("LRANGE");
        self.inner.list_range(queue_key, start, end).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Pulseboard data shapes.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    /// Generate an IPv4 client identifier.
    pub fn arb_client_ip() -> impl Strategy<Value = String> {
        any::<[u8; 4]>().prop_map(|[a, b, c, d]| format!("{}.{}.{}.{}", a, b, c, d))
    }

    /// Generate a user identifier.
    pub fn arb_user_id() -> impl Strategy<Value = String> {
        prop_oneof![
            arb_uuid().prop_map(|id| id.to_string()),
            "[a-z][a-z0-9_]{0,15}",
        ]
    }

    /// Generate a logical cache key of colon-separated segments.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        prop::collection::vec("[a-z0-9_-]{1,12}", 1..4).prop_map(|parts| parts.join(":"))
    }

    /// Generate a TTL in seconds, including 0 (no expiry).
    pub fn arb_ttl_secs() -> impl Strategy<Value = u64> {
        prop_oneof![Just(0u64), 1u64..=604_800]
    }

    /// Generate an AuthFailureRecord.
    pub fn arb_auth_failure_record() -> impl Strategy<Value = AuthFailureRecord> {
        (1u32..1000, arb_timestamp()).prop_map(|(count, first_failure)| AuthFailureRecord {
            count,
            first_failure,
        })
    }

    /// Generate a QueueEntry.
    pub fn arb_queue_entry() -> impl Strategy<Value = QueueEntry> {
        (arb_user_id(), arb_timestamp(), 0u32..10).prop_map(
            |(user_id, requested_at, retry_count)| QueueEntry {
                user_id,
                requested_at,
                retry_count,
            },
        )
    }

    /// Generate a StoreConfig that passes validation.
    pub fn arb_valid_store_config() -> impl Strategy<Value = StoreConfig> {
        (
            "[a-z]{1,10}(\\.[a-z]{1,10}){0,2}",
            1u16..=u16::MAX,
            "[a-z]{1,8}:",
            0u64..86_400,
            1usize..1000,
        )
            .prop_map(|(host, port, prefix, ttl, batch)| StoreConfig {
                host,
                port,
                key_prefix: prefix,
                default_ttl_secs: ttl,
                scan_batch_size: batch,
                ..Default::default()
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-wired stores and caches for common test setups.

    use super::*;

    /// Key prefix used by fixture stores.
    pub const TEST_PREFIX: &str = "test:";

    /// Manual clock frozen at the current time.
    pub fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::starting_now())
    }

    /// StoreConfig pointing at a local server with the test prefix.
    pub fn test_store_config() -> StoreConfig {
        StoreConfig::default()
            .with_prefix(TEST_PREFIX)
            .with_scan_batch_size(10)
    }

    /// Connected in-memory store driven by `clock`.
    pub async fn memory_store(clock: Arc<ManualClock>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new(TEST_PREFIX, clock));
        if let Err(e) = store.connect().await {
            panic!("in-memory store failed to connect: {}", e);
        }
        store
    }

    /// Cache over a connected in-memory store. The store is returned too so
    /// tests can inspect or disconnect it.
    pub async fn memory_cache(clock: Arc<ManualClock>) -> (Arc<Cache>, Arc<InMemoryStore>) {
        let store = memory_store(clock).await;
        let config = CacheConfig::from(&test_store_config());
        let cache = Arc::new(Cache::new(store.clone(), config));
        (cache, store)
    }

    /// Cache whose every store command fails.
    pub fn failing_cache() -> (Arc<Cache>, Arc<FailingStore>) {
        let store = Arc::new(FailingStore::new());
        let cache = Arc::new(Cache::new(store.clone(), CacheConfig::default()));
        (cache, store)
    }
}
