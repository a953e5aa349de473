//! Pulseboard Storage - Key-Value Store and Cache
//!
//! The [`KeyValueStore`] trait with a Redis implementation and a TTL-aware
//! in-memory one, plus the fail-soft [`Cache`] façade every other component
//! is built on.

pub mod cache;
pub mod kv;

pub use cache::{Cache, CacheConfig, CacheRead, CacheStats, ReadSource, TenantKey};
pub use kv::{
    escape_glob, glob_match, scan_keys, ConnectionState, ConnectionStateCell, InMemoryStore,
    KeyPattern, KeyPrefix, KeyValueStore, RedisStore, ScanPage,
};
