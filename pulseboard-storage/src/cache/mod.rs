//! Fail-soft cache layer over the key-value store.
//!
//! The [`Cache`] façade turns every store failure into a safe default so a
//! cache outage can slow requests down but never break them. Values are
//! JSON-encoded; the cache never looks inside them.
//!
//! # Tenant Isolation
//!
//! Aggregates are cached under [`TenantKey`]s, which cannot be built without
//! a tenant ID. [`TenantKey::tenant_pattern`] feeds [`Cache::clear`] for
//! per-tenant invalidation.
//!
//! # Example
//!
//! ```ignore
//! let key = TenantKey::new(tenant_id, "stats", user_id);
//! let read = cache
//!     .get_or_compute(&key.to_string(), Some(300), || load_stats(user_id))
//!     .await?;
//!
//! if read.was_cache_miss() {
//!     tracing::debug!(%key, "Stats recomputed");
//! }
//! ```

pub mod facade;
pub mod read;
pub mod stats;
pub mod tenant_key;

pub use facade::{Cache, CacheConfig};
pub use read::{CacheRead, ReadSource};
pub use stats::CacheStats;
pub use tenant_key::TenantKey;
