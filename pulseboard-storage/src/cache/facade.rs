//! Fail-soft typed cache over a [`KeyValueStore`].
//!
//! Every method degrades to a safe default (`None`, `false`, `0`, no-op) when
//! the store is disconnected or a command fails. Failures are logged at
//! `error` level and counted in [`CacheStats`]; none reach the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{pin_mut, StreamExt};
use pulseboard_core::config::{DEFAULT_SCAN_BATCH_SIZE, DEFAULT_TTL_SECS};
use pulseboard_core::StoreConfig;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::read::CacheRead;
use super::stats::{CacheCounters, CacheStats};
use crate::kv::{scan_keys, KeyValueStore};

/// Configuration for the cache façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without one. 0 stores without expiry.
    pub default_ttl_secs: u64,
    /// Keys requested per scan step in `clear` and `size`.
    pub scan_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL_SECS,
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
        }
    }
}

impl CacheConfig {
    /// Set the default TTL.
    pub fn with_default_ttl(mut self, secs: u64) -> Self {
        self.default_ttl_secs = secs;
        self
    }

    /// Set the scan batch size.
    pub fn with_scan_batch_size(mut self, size: usize) -> Self {
        self.scan_batch_size = size.max(1);
        self
    }
}

impl From<&StoreConfig> for CacheConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            default_ttl_secs: config.default_ttl_secs,
            scan_batch_size: config.scan_batch_size.max(1),
        }
    }
}

/// Typed, fail-soft cache.
///
/// Values are stored as JSON. The cache never inspects value shape; callers
/// pick the type at each call site.
pub struct Cache {
    store: Arc<dyn KeyValueStore>,
    config: CacheConfig,
    counters: CacheCounters,
}

impl Cache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            counters: CacheCounters::default(),
        }
    }

    /// The underlying store, for lifecycle management.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    /// Snapshot of the hit/miss/error counters.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    // ========================================================================
    // SCALAR ENTRIES
    // ========================================================================

    /// Read and decode a value.
    ///
    /// An entry that fails to decode is treated as a miss and deleted in the
    /// background.
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        if !self.store.is_connected() {
            self.counters.miss();
            return None;
        }

        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.counters.miss();
                return None;
            }
            Err(e) => {
                self.counters.error();
                tracing::error!(key = %key, error = %e, "Cache get failed");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.counters.hit();
                Some(value)
            }
            Err(e) => {
                self.counters.miss();
                tracing::error!(key = %key, error = %e, "Discarding undecodable cache entry");
                self.evict_corrupt(key).await;
                None
            }
        }
    }

    /// Encode and store a value. `ttl_secs` falls back to the configured
    /// default; an effective TTL of 0 stores without expiry.
    pub async fn set<T>(&self, key: &str, value: &T, ttl_secs: Option<u64>)
    where
        T: Serialize + ?Sized,
    {
        if !self.store.is_connected() {
            return;
        }

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Cache value serialization failed");
                return;
            }
        };

        let ttl = ttl_secs.unwrap_or(self.config.default_ttl_secs);
        if let Err(e) = self.store.set(key, &bytes, ttl).await {
            self.counters.error();
            tracing::error!(key = %key, ttl, error = %e, "Cache set failed");
        }
    }

    /// Returns true if the key existed and was deleted.
    pub async fn delete(&self, key: &str) -> bool {
        if !self.store.is_connected() {
            return false;
        }
        match self.store.delete(key).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.counters.error();
                tracing::error!(key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        if !self.store.is_connected() {
            return false;
        }
        match self.store.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                self.counters.error();
                tracing::error!(key = %key, error = %e, "Cache exists failed");
                false
            }
        }
    }

    /// Remaining lifetime of an entry. `None` when absent, persistent, or on
    /// failure.
    pub async fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        if !self.store.is_connected() {
            return None;
        }
        match self.store.ttl(key).await {
            Ok(secs) => secs.map(Duration::from_secs),
            Err(e) => {
                self.counters.error();
                tracing::error!(key = %key, error = %e, "Cache ttl lookup failed");
                None
            }
        }
    }

    // ========================================================================
    // BULK
    // ========================================================================

    /// Delete every key matching `pattern` (default `*`) under this cache's
    /// prefix. Returns the number of keys deleted.
    ///
    /// Runs as batched scan + delete, yielding between batches. Stops at the
    /// first store error, leaving later batches in place.
    pub async fn clear(&self, pattern: Option<&str>) -> u64 {
        if !self.store.is_connected() {
            return 0;
        }
        let pattern = pattern.unwrap_or("*");

        let batches = scan_keys(self.store.as_ref(), pattern, self.config.scan_batch_size);
        pin_mut!(batches);

        let mut deleted = 0u64;
        while let Some(batch) = batches.next().await {
            let result = match batch {
                Ok(keys) if keys.is_empty() => continue,
                Ok(keys) => self.store.delete_many(&keys).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(count) => deleted += count,
                Err(e) => {
                    self.counters.error();
                    tracing::error!(pattern, deleted, error = %e, "Cache clear aborted");
                    return deleted;
                }
            }
        }

        tracing::debug!(pattern, deleted, "Cache cleared");
        deleted
    }

    /// Number of keys under this cache's prefix. 0 when disconnected or on
    /// failure.
    ///
    /// Counted by scan, so against a live server a key rewritten mid-scan may
    /// be counted twice.
    pub async fn size(&self) -> u64 {
        if !self.store.is_connected() {
            return 0;
        }

        let batches = scan_keys(self.store.as_ref(), "*", self.config.scan_batch_size);
        pin_mut!(batches);

        let mut total = 0u64;
        while let Some(batch) = batches.next().await {
            match batch {
                Ok(keys) => total += keys.len() as u64,
                Err(e) => {
                    self.counters.error();
                    tracing::error!(error = %e, "Cache size failed");
                    return 0;
                }
            }
        }
        total
    }

    // ========================================================================
    // QUEUES
    // ========================================================================

    /// Append an encoded value to the tail of a list. Returns the new length,
    /// or `None` on any failure.
    pub async fn push_to_queue<T>(&self, queue_key: &str, value: &T) -> Option<u64>
    where
        T: Serialize + ?Sized,
    {
        if !self.store.is_connected() {
            return None;
        }

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(queue = %queue_key, error = %e, "Queue entry serialization failed");
                return None;
            }
        };

        match self.store.list_push(queue_key, &bytes).await {
            Ok(len) => Some(len),
            Err(e) => {
                self.counters.error();
                tracing::error!(queue = %queue_key, error = %e, "Queue push failed");
                None
            }
        }
    }

    /// Returns true if any decodable entry of the list satisfies `predicate`.
    ///
    /// Loads the whole list and decodes every entry, so each check is
    /// O(queue length). Entries that fail to decode are skipped.
    pub async fn is_member_of_queue<T, P>(&self, queue_key: &str, predicate: P) -> bool
    where
        T: DeserializeOwned,
        P: Fn(&T) -> bool,
    {
        if !self.store.is_connected() {
            return false;
        }

        let entries = match self.store.list_range(queue_key, 0, -1).await {
            Ok(entries) => entries,
            Err(e) => {
                self.counters.error();
                tracing::error!(queue = %queue_key, error = %e, "Queue membership check failed");
                return false;
            }
        };

        entries.iter().any(|raw| match serde_json::from_slice::<T>(raw) {
            Ok(entry) => predicate(&entry),
            Err(e) => {
                tracing::warn!(queue = %queue_key, error = %e, "Skipping undecodable queue entry");
                false
            }
        })
    }

    /// Length of a list. 0 when absent, disconnected, or on failure.
    pub async fn queue_len(&self, queue_key: &str) -> u64 {
        if !self.store.is_connected() {
            return 0;
        }
        match self.store.list_range(queue_key, 0, -1).await {
            Ok(entries) => entries.len() as u64,
            Err(e) => {
                self.counters.error();
                tracing::error!(queue = %queue_key, error = %e, "Queue length lookup failed");
                0
            }
        }
    }

    // ========================================================================
    // READ-THROUGH
    // ========================================================================

    /// Serve `key` from the cache, or run `compute` and cache its result.
    ///
    /// Errors from `compute` are returned and nothing is cached. Cache
    /// failures on either side are swallowed, so a store outage only costs a
    /// recomputation.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_secs: Option<u64>,
        compute: F,
    ) -> Result<CacheRead<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key).await {
            return Ok(CacheRead::from_cache(value));
        }

        let value = compute().await?;
        self.set(key, &value, ttl_secs).await;
        Ok(CacheRead::computed(value))
    }

    /// Delete a corrupt entry without making the reader wait for it.
    async fn evict_corrupt(&self, key: &str) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                let key = key.to_string();
                handle.spawn(async move {
                    if let Err(e) = store.delete(&key).await {
                        tracing::error!(key = %key, error = %e, "Failed to delete corrupt cache entry");
                    }
                });
            }
            Err(_) => {
                if let Err(e) = self.store.delete(key).await {
                    tracing::error!(key = %key, error = %e, "Failed to delete corrupt cache entry");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::InMemoryStore;
    use pulseboard_core::ManualClock;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
    }

    async fn connected_cache() -> (Cache, Arc<InMemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryStore::new("test:", clock.clone()));
        store.connect().await.expect("connect");
        let cache = Cache::new(store.clone(), CacheConfig::default().with_scan_batch_size(3));
        (cache, store, clock)
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let (cache, _, _) = connected_cache().await;
        let profile = Profile {
            name: "a".to_string(),
        };

        cache.set("user:42", &profile, Some(300)).await;
        assert_eq!(cache.get::<Profile>("user:42").await, Some(profile));
        assert!(cache.exists("user:42").await);
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (cache, _, clock) = connected_cache().await;

        cache.set("short", &1u32, Some(1)).await;
        clock.advance(Duration::from_millis(1_100));

        assert_eq!(cache.get::<u32>("short").await, None);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_default_ttl_and_zero_ttl() {
        let (cache, _, _) = connected_cache().await;

        cache.set("default", &1u32, None).await;
        assert_eq!(
            cache.ttl_remaining("default").await,
            Some(Duration::from_secs(DEFAULT_TTL_SECS))
        );

        cache.set("forever", &1u32, Some(0)).await;
        assert!(cache.exists("forever").await);
        assert_eq!(cache.ttl_remaining("forever").await, None);
    }

    #[tokio::test]
    async fn test_disconnected_cache_returns_defaults() {
        let (cache, store, _) = connected_cache().await;
        cache.set("k", &1u32, None).await;
        store.destroy().await.expect("destroy");

        assert_eq!(cache.get::<u32>("k").await, None);
        cache.set("k", &2u32, None).await;
        assert!(!cache.delete("k").await);
        assert!(!cache.exists("k").await);
        assert_eq!(cache.clear(None).await, 0);
        assert_eq!(cache.size().await, 0);
        assert_eq!(cache.ttl_remaining("k").await, None);
        assert_eq!(cache.push_to_queue("q", &1u32).await, None);
        assert!(!cache.is_member_of_queue::<u32, _>("q", |_| true).await);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss_and_deleted() {
        let (cache, store, _) = connected_cache().await;
        store.insert_raw("bad", b"{not json").expect("insert");

        assert_eq!(cache.get::<Profile>("bad").await, None);

        for _ in 0..10 {
            if !store.exists("bad").await.expect("exists") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!store.exists("bad").await.expect("exists"));
    }

    #[tokio::test]
    async fn test_size_and_clear_namespace() {
        let (cache, _, _) = connected_cache().await;
        assert_eq!(cache.size().await, 0);

        cache
            .set(
                "user:42",
                &Profile {
                    name: "a".to_string(),
                },
                Some(300),
            )
            .await;
        assert_eq!(cache.size().await, 1);

        cache.clear(None).await;
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_clear_with_pattern_spans_batches() {
        let (cache, _, _) = connected_cache().await;
        for i in 0..10 {
            cache.set(&format!("user:{}", i), &i, None).await;
        }
        cache.set("session:1", &1u32, None).await;

        assert_eq!(cache.clear(Some("user:*")).await, 10);
        assert_eq!(cache.size().await, 1);
        assert!(cache.exists("session:1").await);
    }

    #[tokio::test]
    async fn test_queue_membership() {
        let (cache, _, _) = connected_cache().await;

        assert_eq!(cache.push_to_queue("queue:jobs", &"u1").await, Some(1));
        assert_eq!(cache.push_to_queue("queue:jobs", &"u2").await, Some(2));
        assert_eq!(cache.queue_len("queue:jobs").await, 2);

        assert!(cache.is_member_of_queue::<String, _>("queue:jobs", |u| u == "u2").await);
        assert!(!cache.is_member_of_queue::<String, _>("queue:jobs", |u| u == "u3").await);
        assert!(!cache.is_member_of_queue::<String, _>("queue:none", |_| true).await);
    }

    #[tokio::test]
    async fn test_queue_membership_skips_undecodable_entries() {
        let (cache, store, _) = connected_cache().await;
        store.list_push("queue:jobs", b"garbage").await.expect("push");
        cache.push_to_queue("queue:jobs", &7u32).await;

        assert!(cache.is_member_of_queue::<u32, _>("queue:jobs", |v| *v == 7).await);
    }

    #[tokio::test]
    async fn test_get_or_compute_caches_result() -> Result<(), String> {
        let (cache, _, _) = connected_cache().await;

        let first = cache
            .get_or_compute("agg:1", Some(60), || async { Ok::<_, String>(10u64) })
            .await?;
        assert!(first.was_cache_miss());
        assert_eq!(*first.value(), 10);

        let second = cache
            .get_or_compute("agg:1", Some(60), || async {
                Err::<u64, _>("should not recompute".to_string())
            })
            .await?;
        assert!(second.was_cache_hit());
        assert_eq!(second.into_value(), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_or_compute_propagates_compute_error() {
        let (cache, _, _) = connected_cache().await;

        let result = cache
            .get_or_compute("agg:2", None, || async { Err::<u64, _>("db down") })
            .await;
        assert_eq!(result, Err("db down"));
        assert!(!cache.exists("agg:2").await);
    }

    #[tokio::test]
    async fn test_get_or_compute_works_without_store() -> Result<(), String> {
        let (cache, store, _) = connected_cache().await;
        store.destroy().await.map_err(|e| e.to_string())?;

        let read = cache
            .get_or_compute("agg:3", None, || async { Ok::<_, String>(5u8) })
            .await?;
        assert_eq!(read.into_value(), 5);
        Ok(())
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime")
    }

    proptest! {
        #[test]
        fn prop_set_then_get_returns_equal_value(
            key in "[a-z]{1,8}(:[a-z0-9]{1,8}){0,2}",
            name in ".{0,32}",
            ttl in 1u64..86_400,
        ) {
            let rt = runtime();
            let value = Profile { name };
            let got = rt.block_on(async {
                let (cache, _, _) = connected_cache().await;
                cache.set(&key, &value, Some(ttl)).await;
                cache.get::<Profile>(&key).await
            });
            prop_assert_eq!(got, Some(value));
        }
    }
}
