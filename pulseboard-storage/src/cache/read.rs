//! Result wrapper for read-through lookups.

/// Where a read-through value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Decoded from a cached entry.
    Cache,
    /// Produced by the compute closure on a miss.
    Computed,
}

/// Value returned by [`Cache::get_or_compute`](super::Cache::get_or_compute),
/// tagged with whether it was served from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn from_cache(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Cache,
        }
    }

    pub fn computed(value: T) -> Self {
        Self {
            value,
            source: ReadSource::Computed,
        }
    }

    /// Consume the wrapper and return the underlying value.
    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit()
    }

    /// Map the inner value to a new type.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            source: self.source,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_flags() {
        let hit = CacheRead::from_cache(1);
        assert!(hit.was_cache_hit());
        assert!(!hit.was_cache_miss());

        let miss = CacheRead::computed(1);
        assert!(miss.was_cache_miss());
        assert_eq!(miss.source(), ReadSource::Computed);
    }

    #[test]
    fn test_map_preserves_source() {
        let read = CacheRead::from_cache(21).map(|v| v * 2);
        assert_eq!(*read.value(), 42);
        assert!(read.was_cache_hit());
        assert_eq!(read.into_value(), 42);
    }
}
