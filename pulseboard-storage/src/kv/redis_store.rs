//! Redis-backed key-value store.
//!
//! Holds a single [`MultiplexedConnection`], which is cheap to clone and
//! pipelines concurrent commands over one socket. The connection is opened
//! explicitly by [`connect`](KeyValueStore::connect); constructing the store
//! does no I/O.
//!
//! # Reconnection
//!
//! Commands never retry. When a command fails because the socket is gone, or
//! the initial connect fails, the store flips to `Disconnected` and a
//! background task re-dials with exponential backoff until it succeeds or
//! [`destroy`](KeyValueStore::destroy) is called. Only one such task runs at
//! a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

use pulseboard_core::{StoreConfig, StoreError, StoreResult};

use super::{
    ensure_connected, ConnectionState, ConnectionStateCell, KeyPrefix, KeyValueStore, ScanPage,
};

/// [`KeyValueStore`] over a Redis-protocol server.
pub struct RedisStore {
    inner: Arc<Inner>,
}

/// State shared with the re-dial task.
struct Inner {
    config: StoreConfig,
    prefix: KeyPrefix,
    state: ConnectionStateCell,
    conn: RwLock<Option<MultiplexedConnection>>,
    /// Set by `destroy`; stops the re-dial task.
    closed: AtomicBool,
    /// Set while a re-dial task is running.
    reconnecting: AtomicBool,
}

impl RedisStore {
    /// Create a disconnected store.
    pub fn new(config: StoreConfig) -> Self {
        let prefix = KeyPrefix::new(config.key_prefix.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                prefix,
                state: ConnectionStateCell::default(),
                conn: RwLock::new(None),
                closed: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
            }),
        }
    }

    /// Create a disconnected store from environment variables.
    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    fn prefix(&self) -> &KeyPrefix {
        &self.inner.prefix
    }

    /// Clone the live connection, or fail fast if there is none.
    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        ensure_connected(&self.inner.state)?;
        self.inner
            .conn
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotConnected)
    }

    /// Convert a command error. When the error means the socket is gone the
    /// store is marked disconnected and a re-dial is scheduled.
    fn observe(&self, command: &str, err: RedisError) -> StoreError {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
            if self
                .inner
                .state
                .transition(ConnectionState::Connected, ConnectionState::Disconnected)
            {
                tracing::warn!(
                    addr = %self.inner.config.display_target(),
                    command,
                    error = %err,
                    "Key-value store connection lost"
                );
                spawn_reconnect(&self.inner);
            }
        }
        StoreError::command(command, err)
    }
}

impl Inner {
    async fn open(&self) -> StoreResult<MultiplexedConnection> {
        let target = self.config.display_target();
        let failed = |reason: String| StoreError::ConnectionFailed {
            target: target.clone(),
            reason,
        };

        let client = Client::open(self.config.connection_url()).map_err(|e| failed(e.to_string()))?;

        let mut conn = tokio::time::timeout(
            self.config.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| failed(format!("timed out after {:?}", self.config.connect_timeout)))?
        .map_err(|e| failed(e.to_string()))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| failed(e.to_string()))?;

        Ok(conn)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Start the re-dial task unless one is already running or the store was
/// destroyed. Outside a Tokio runtime there is nothing to spawn on, and the
/// store stays down until the next explicit `connect`.
fn spawn_reconnect(inner: &Arc<Inner>) {
    if inner.is_closed() || inner.reconnecting.swap(true, Ordering::AcqRel) {
        return;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        inner.reconnecting.store(false, Ordering::Release);
        return;
    };

    let inner = Arc::clone(inner);
    handle.spawn(async move {
        redial(&inner).await;
    });
}

async fn redial(inner: &Inner) {
    let mut delay = inner.config.reconnect_initial_delay;
    let mut attempt: u32 = 0;

    loop {
        tokio::time::sleep(delay).await;
        if inner.is_closed() {
            break;
        }
        attempt += 1;

        match inner.open().await {
            Ok(conn) => {
                let mut slot = inner.conn.write().await;
                // An explicit connect or destroy may have won the race.
                if !inner.is_closed() && inner.state.get() != ConnectionState::Connected {
                    *slot = Some(conn);
                    // Clear the flag first so a loss right after this
                    // point schedules a fresh task.
                    inner.reconnecting.store(false, Ordering::Release);
                    inner.state.set(ConnectionState::Connected);
                    tracing::info!(
                        addr = %inner.config.display_target(),
                        attempt,
                        "Key-value store reconnected"
                    );
                    return;
                }
                break;
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "Key-value store re-dial failed");
                delay = delay.saturating_mul(2).min(inner.config.reconnect_max_delay);
            }
        }
    }

    inner.reconnecting.store(false, Ordering::Release);
}

fn redis_index(index: i64) -> isize {
    isize::try_from(index).unwrap_or(if index < 0 { isize::MIN } else { isize::MAX })
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn connect(&self) -> StoreResult<()> {
        let inner = &self.inner;
        // Holding the write guard serializes concurrent connect calls.
        let mut slot = inner.conn.write().await;
        inner.closed.store(false, Ordering::Release);
        if slot.is_some() && inner.state.get() == ConnectionState::Connected {
            return Ok(());
        }

        inner.state.set(ConnectionState::Connecting);
        tracing::debug!(addr = %inner.config.display_target(), "Connecting to key-value store");

        match inner.open().await {
            Ok(conn) => {
                *slot = Some(conn);
                inner.state.set(ConnectionState::Connected);
                tracing::info!(
                    addr = %inner.config.display_target(),
                    prefix = inner.prefix.as_str(),
                    "Key-value store connected"
                );
                Ok(())
            }
            Err(e) => {
                *slot = None;
                inner.state.set(ConnectionState::Disconnected);
                tracing::error!(error = %e, "Key-value store connection failed");
                spawn_reconnect(inner);
                Err(e)
            }
        }
    }

    async fn destroy(&self) -> StoreResult<()> {
        let inner = &self.inner;
        inner.closed.store(true, Ordering::Release);
        let mut slot = inner.conn.write().await;
        if slot.take().is_some() {
            tracing::info!(addr = %inner.config.display_target(), "Key-value store disconnected");
        }
        inner.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    fn key_prefix(&self) -> &str {
        self.inner.prefix.as_str()
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.observe("PING", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.get(self.prefix().apply(key))
            .await
            .map_err(|e| self.observe("GET", e))
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let stored = self.prefix().apply(key);
        if ttl_secs > 0 {
            let _: () = conn
                .set_ex(&stored, value, ttl_secs)
                .await
                .map_err(|e| self.observe("SETEX", e))?;
        } else {
            let _: () = conn
                .set(&stored, value)
                .await
                .map_err(|e| self.observe("SET", e))?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let deleted: u64 = conn
            .del(self.prefix().apply(key))
            .await
            .map_err(|e| self.observe("DEL", e))?;
        Ok(deleted > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection().await?;
        let stored: Vec<String> = keys.iter().map(|k| self.prefix().apply(k)).collect();
        conn.del(stored).await.map_err(|e| self.observe("DEL", e))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        conn.exists(self.prefix().apply(key))
            .await
            .map_err(|e| self.observe("EXISTS", e))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.connection().await?;
        let remaining: i64 = conn
            .ttl(self.prefix().apply(key))
            .await
            .map_err(|e| self.observe("TTL", e))?;
        // -2: no such key, -1: no expiry.
        Ok(u64::try_from(remaining).ok())
    }

    async fn scan_page(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let mut conn = self.connection().await?;
        let (next_cursor, stored): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(self.prefix().apply_pattern(pattern))
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| self.observe("SCAN", e))?;

        let keys = stored
            .iter()
            .filter_map(|k| self.prefix().strip(k))
            .map(str::to_string)
            .collect();
        Ok(ScanPage { next_cursor, keys })
    }

    async fn list_push(&self, queue_key: &str, value: &[u8]) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        conn.rpush(self.prefix().apply(queue_key), value)
            .await
            .map_err(|e| self.observe("RPUSH", e))
    }

    async fn list_range(
        &self,
        queue_key: &str,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.lrange(
            self.prefix().apply(queue_key),
            redis_index(start),
            redis_index(end),
        )
        .await
        .map_err(|e| self.observe("LRANGE", e))
    }
}
