//! Cache layer for rendered embeds.
//!
//! Embedding a vault file (an SVG drawing, another note) is expensive and
//! happens on every preview refresh. Results are stored in named buckets and
//! validated by an etag, normally the vault's version string for the file,
//! so a changed file misses and an unchanged one hits.
//!
//! - [`Cache`]: factory for named buckets
//! - [`CacheBucket`]: key-value store with etag validation and invalidation
//!
//! Implementations: [`NullCache`] (always misses), [`MemoryCache`] (process
//! lifetime, shared between handles) and [`FileCache`] (persisted across runs).
//!
//! ```
//! use ww_cache::{Cache, CacheBucketExt, MemoryCache};
//!
//! let cache = MemoryCache::new();
//! let bucket = cache.bucket("embeds");
//! bucket.set_string("drawings/flow.svg", "v1", "<img />");
//! assert_eq!(bucket.get_string("drawings/flow.svg", "v1").as_deref(), Some("<img />"));
//! assert_eq!(bucket.get_string("drawings/flow.svg", "v2"), None);
//! ```

mod ext;
mod file;
mod memory;

pub use ext::CacheBucketExt;
pub use file::FileCache;
pub use memory::MemoryCache;

/// A named partition within a [`Cache`].
///
/// A hit requires both the key and the etag to match. An empty etag on
/// lookup skips validation.
pub trait CacheBucket: Send + Sync {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>>;

    /// Store a value, replacing any entry for `key` whatever its etag.
    fn set(&self, key: &str, etag: &str, value: &[u8]);

    /// Drop the entry for `key` if present.
    fn invalidate(&self, key: &str);
}

/// Factory for isolated [`CacheBucket`]s.
pub trait Cache: Send + Sync {
    /// Open or create a named bucket.
    ///
    /// Handles opened with the same name share storage.
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// Bucket that stores nothing.
pub struct NullCacheBucket;

impl CacheBucket for NullCacheBucket {
    fn get(&self, _key: &str, _etag: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _etag: &str, _value: &[u8]) {}

    fn invalidate(&self, _key: &str) {}
}

/// Cache used when caching is disabled.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(NullCacheBucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_cache_always_misses() {
        let bucket = NullCache.bucket("embeds");
        bucket.set("key", "etag1", b"hello");
        assert_eq!(bucket.get("key", "etag1"), None);
        assert_eq!(bucket.get("key", ""), None);
    }
}
