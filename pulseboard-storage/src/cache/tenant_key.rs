//! Tenant-scoped cache keys.
//!
//! A [`TenantKey`] can only be built with a tenant ID, so aggregate cache
//! entries are always namespaced by tenant and one tenant's entries can be
//! invalidated without touching another's.

use std::fmt;

use uuid::Uuid;

use crate::kv::escape_glob;

/// Leading segment of every tenant-scoped key.
const TENANT_SEGMENT: &str = "tenant";

/// A cache key scoped to a specific tenant.
///
/// Renders as `tenant:<tenant_id>:<namespace>:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantKey {
    inner: TenantKeyInner,
}

/// Private inner struct - prevents construction without `new()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TenantKeyInner {
    tenant_id: Uuid,
    namespace: String,
    id: String,
}

impl TenantKey {
    /// Create a tenant-scoped key.
    ///
    /// * `tenant_id` - The tenant this key belongs to
    /// * `namespace` - The kind of cached value, e.g. `"stats"`
    /// * `id` - Identifier within the namespace
    pub fn new(tenant_id: Uuid, namespace: impl Into<String>, id: impl fmt::Display) -> Self {
        Self {
            inner: TenantKeyInner {
                tenant_id,
                namespace: namespace.into(),
                id: id.to_string(),
            },
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        self.inner.tenant_id
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Glob matching every key of one tenant, for `Cache::clear`.
    pub fn tenant_pattern(tenant_id: Uuid) -> String {
        format!("{}:{}:*", TENANT_SEGMENT, tenant_id)
    }

    /// Glob matching every key of one namespace within a tenant.
    pub fn namespace_pattern(tenant_id: Uuid, namespace: &str) -> String {
        format!(
            "{}:{}:{}:*",
            TENANT_SEGMENT,
            tenant_id,
            escape_glob(namespace)
        )
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            TENANT_SEGMENT, self.inner.tenant_id, self.inner.namespace, self.inner.id
        )
    }
}

impl From<&TenantKey> for String {
    fn from(key: &TenantKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::glob_match;

    #[test]
    fn test_new_and_getters() {
        let tenant_id = Uuid::now_v7();
        let key = TenantKey::new(tenant_id, "stats", 42);

        assert_eq!(key.tenant_id(), tenant_id);
        assert_eq!(key.namespace(), "stats");
        assert_eq!(key.id(), "42");
        assert_eq!(key.to_string(), format!("tenant:{}:stats:42", tenant_id));
    }

    #[test]
    fn test_different_tenants_different_keys() {
        let key1 = TenantKey::new(Uuid::now_v7(), "stats", "a");
        let key2 = TenantKey::new(Uuid::now_v7(), "stats", "a");
        assert_ne!(key1.to_string(), key2.to_string());
    }

    #[test]
    fn test_tenant_pattern_matches_only_own_keys() {
        let tenant = Uuid::now_v7();
        let other = Uuid::now_v7();
        let pattern = TenantKey::tenant_pattern(tenant);

        assert!(glob_match(&pattern, &TenantKey::new(tenant, "stats", 1).to_string()));
        assert!(glob_match(&pattern, &TenantKey::new(tenant, "leaderboard", 1).to_string()));
        assert!(!glob_match(&pattern, &TenantKey::new(other, "stats", 1).to_string()));
    }

    #[test]
    fn test_namespace_pattern() {
        let tenant = Uuid::now_v7();
        let pattern = TenantKey::namespace_pattern(tenant, "stats");

        assert!(glob_match(&pattern, &TenantKey::new(tenant, "stats", 7).to_string()));
        assert!(!glob_match(&pattern, &TenantKey::new(tenant, "other", 7).to_string()));
    }
}
