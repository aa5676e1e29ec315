//! Cache layer for tome.
//!
//! Two independent pieces live here:
//!
//! - Persistence buckets. [`Cache`] hands out named [`CacheBucket`]s, which
//!   store raw bytes under a key and validate them with an etag. [`FileCache`]
//!   writes buckets to disk; [`NullCache`] discards everything.
//! - [`ModelCache`], a bounded least-recently-used cache for document
//!   payloads. When it overflows it hands the coldest entry to an eviction
//!   handler (usually one that writes into a bucket) and then drops it.
//!
//! # Example
//!
//! ```
//! use tome_cache::{Cache, NullCache};
//!
//! let cache = NullCache;
//! let bucket = cache.bucket("models");
//! bucket.set("articles/intro.md", "v1", b"{}").unwrap();
//! assert_eq!(bucket.get("articles/intro.md", "v1"), None); // NullCache always misses
//! ```

mod ext;
mod file;
mod model_cache;

pub use ext::CacheBucketExt;
pub use file::FileCache;
pub use model_cache::{CacheEntry, DEFAULT_CAPACITY, EvictHandler, ModelCache};

/// A payload could not be written to a [`CacheBucket`].
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("cache write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Byte store behind one name of a [`Cache`].
///
/// Records carry an opaque etag set by the writer. Readers pass the etag they
/// expect, so records left by another build session read as misses.
pub trait CacheBucket: Send + Sync {
    /// Stored bytes for `key`, or `None` when absent or written under a
    /// different etag. An empty `etag` accepts any record.
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>>;

    /// Replace the record for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`] when the record cannot be written.
    fn set(&self, key: &str, etag: &str, value: &[u8]) -> Result<(), PersistError>;

    /// Drop the record for `key`, if any.
    fn remove(&self, key: &str);
}

/// Source of [`CacheBucket`]s, one per name.
pub trait Cache: Send + Sync {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket>;
}

/// Persistence turned off: writes vanish, reads miss.
pub struct NullCache;

impl Cache for NullCache {
    fn bucket(&self, _name: &str) -> Box<dyn CacheBucket> {
        Box::new(Discard)
    }
}

struct Discard;

impl CacheBucket for Discard {
    fn get(&self, _key: &str, _etag: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, _key: &str, _etag: &str, _value: &[u8]) -> Result<(), PersistError> {
        Ok(())
    }

    fn remove(&self, _key: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_cache_forgets_writes() {
        let bucket = NullCache.bucket("models");
        bucket.set("api/a.md", "s1", b"{}").unwrap();
        bucket.remove("api/b.md");

        assert_eq!(bucket.get("api/a.md", "s1"), None);
        assert_eq!(bucket.get("api/a.md", ""), None);
    }

    #[test]
    fn test_write_failure_message() {
        let err = PersistError::from(std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "cache write failed: disk full");
    }
}
