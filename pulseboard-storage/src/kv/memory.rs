//! In-process key-value store with per-key expiry.
//!
//! Mirrors the Redis semantics the cache relies on (TTL, glob scans,
//! lists, WRONGTYPE errors) so the full stack can run without a server.
//! Expiry is evaluated against the injected [`Clock`], which lets tests move
//! time forward instead of sleeping.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use pulseboard_core::{Clock, StoreError, StoreResult, Timestamp};

use super::glob::KeyPattern;
use super::{
    ensure_connected, ConnectionState, ConnectionStateCell, KeyPrefix, KeyValueStore, ScanPage,
};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    List(Vec<Vec<u8>>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Timestamp>,
    /// Insertion sequence. Scan cursors walk this order, so deleting keys
    /// that were already returned never makes the scan skip others.
    seq: u64,
}

impl Entry {
    fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Keyspace {
    fn live(&self, key: &str, now: Timestamp) -> Option<&Entry> {
        self.entries.get(key).filter(|e| e.is_live(now))
    }

    /// Drop the entry if it has expired so writers start from a clean slot.
    fn purge_expired(&mut self, key: &str, now: Timestamp) {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// TTL-aware in-memory [`KeyValueStore`].
///
/// Starts disconnected, like a network client; call
/// [`connect`](KeyValueStore::connect) before use. Commands issued while
/// disconnected fail with [`StoreError::NotConnected`].
pub struct InMemoryStore {
    prefix: KeyPrefix,
    clock: Arc<dyn Clock>,
    state: ConnectionStateCell,
    keyspace: RwLock<Keyspace>,
}

impl InMemoryStore {
    pub fn new(prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            prefix: KeyPrefix::new(prefix),
            clock,
            state: ConnectionStateCell::default(),
            keyspace: RwLock::new(Keyspace::default()),
        }
    }

    /// Number of live keys across all prefixes.
    pub fn raw_len(&self) -> usize {
        let now = self.clock.now();
        self.keyspace
            .read()
            .map(|ks| ks.entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    /// Insert raw bytes under a logical key, bypassing connection checks.
    /// Used to plant corrupt payloads in tests.
    pub fn insert_raw(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut ks = self.keyspace.write().map_err(|_| StoreError::LockPoisoned)?;
        let seq = ks.bump_seq();
        ks.entries.insert(
            self.prefix.apply(key),
            Entry {
                value: Value::Bytes(value.to_vec()),
                expires_at: None,
                seq,
            },
        );
        Ok(())
    }

    fn expiry(&self, now: Timestamp, ttl_secs: u64) -> Option<Timestamp> {
        if ttl_secs == 0 {
            return None;
        }
        let ttl = chrono::Duration::try_seconds(i64::try_from(ttl_secs).ok()?)?;
        now.checked_add_signed(ttl)
    }

    fn wrong_type(command: &str) -> StoreError {
        StoreError::command(
            command,
            "WRONGTYPE Operation against a key holding the wrong kind of value",
        )
    }
}

/// Resolve a Redis-style inclusive range against a list of `len` items.
fn resolve_range(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };
    if len == 0 || start > end || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(end).ok()?))
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn connect(&self) -> StoreResult<()> {
        if self.state.get() == ConnectionState::Connected {
            return Ok(());
        }
        self.state.set(ConnectionState::Connected);
        tracing::debug!(prefix = self.prefix.as_str(), "In-memory store connected");
        Ok(())
    }

    async fn destroy(&self) -> StoreResult<()> {
        if self.state.get() == ConnectionState::Disconnected {
            return Ok(());
        }
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn key_prefix(&self) -> &str {
        self.prefix.as_str()
    }

    async fn ping(&self) -> StoreResult<()> {
        ensure_connected(&self.state)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let ks = self.keyspace.read().map_err(|_| StoreError::LockPoisoned)?;
        match ks.live(&self.prefix.apply(key), now).map(|e| &e.value) {
            Some(Value::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(Value::List(_)) => Err(Self::wrong_type("GET")),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> StoreResult<()> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let stored = self.prefix.apply(key);
        let mut ks = self.keyspace.write().map_err(|_| StoreError::LockPoisoned)?;
        ks.purge_expired(&stored, now);

        let seq = match ks.entries.get(&stored).map(|e| e.seq) {
            Some(seq) => seq,
            None => ks.bump_seq(),
        };
        ks.entries.insert(
            stored,
            Entry {
                value: Value::Bytes(value.to_vec()),
                expires_at: self.expiry(now, ttl_secs),
                seq,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let mut ks = self.keyspace.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(ks
            .entries
            .remove(&self.prefix.apply(key))
            .is_some_and(|e| e.is_live(now)))
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<u64> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let mut ks = self.keyspace.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut deleted = 0u64;
        for key in keys {
            if ks
                .entries
                .remove(&self.prefix.apply(key))
                .is_some_and(|e| e.is_live(now))
            {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let ks = self.keyspace.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(ks.live(&self.prefix.apply(key), now).is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let ks = self.keyspace.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(ks
            .live(&self.prefix.apply(key), now)
            .and_then(|e| e.expires_at)
            .map(|at| {
                let millis = at.signed_duration_since(now).num_milliseconds().max(0);
                // Round up like Redis: a key with 0.4s left still reports 1.
                u64::try_from((millis + 999) / 1000).unwrap_or(0)
            }))
    }

    async fn scan_page(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let ks = self.keyspace.read().map_err(|_| StoreError::LockPoisoned)?;

        let mut candidates: Vec<(u64, &str)> = ks
            .entries
            .iter()
            .filter(|(_, e)| e.seq >= cursor && e.is_live(now))
            .map(|(k, e)| (e.seq, k.as_str()))
            .collect();
        candidates.sort_unstable_by_key(|(seq, _)| *seq);

        let examined = &candidates[..candidates.len().min(count.max(1))];
        let matcher = KeyPattern::new(pattern);
        let keys = examined
            .iter()
            .filter_map(|(_, stored)| self.prefix.strip(stored))
            .filter(|logical| matcher.is_match(logical))
            .map(str::to_string)
            .collect();

        let next_cursor = if examined.len() < candidates.len() {
            examined.last().map_or(0, |(seq, _)| seq + 1)
        } else {
            0
        };

        Ok(ScanPage { next_cursor, keys })
    }

    async fn list_push(&self, queue_key: &str, value: &[u8]) -> StoreResult<u64> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let stored = self.prefix.apply(queue_key);
        let mut ks = self.keyspace.write().map_err(|_| StoreError::LockPoisoned)?;
        ks.purge_expired(&stored, now);

        if !ks.entries.contains_key(&stored) {
            let seq = ks.bump_seq();
            ks.entries.insert(
                stored.clone(),
                Entry {
                    value: Value::List(Vec::new()),
                    expires_at: None,
                    seq,
                },
            );
        }

        match ks.entries.get_mut(&stored).map(|e| &mut e.value) {
            Some(Value::List(items)) => {
                items.push(value.to_vec());
                Ok(items.len() as u64)
            }
            _ => Err(Self::wrong_type("RPUSH")),
        }
    }

    async fn list_range(
        &self,
        queue_key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<Vec<u8>>> {
        ensure_connected(&self.state)?;
        let now = self.clock.now();
        let ks = self.keyspace.read().map_err(|_| StoreError::LockPoisoned)?;
        match ks.live(&self.prefix.apply(queue_key), now).map(|e| &e.value) {
            Some(Value::List(items)) => Ok(resolve_range(items.len(), start, end)
                .map(|(from, to)| items[from..=to].to_vec())
                .unwrap_or_default()),
            Some(Value::Bytes(_)) => Err(Self::wrong_type("LRANGE")),
            None => Ok(Vec::new()),
        }
    }
}
