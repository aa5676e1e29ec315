//! Typed helpers on top of [`CacheBucket`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CacheBucket, PersistError};

/// JSON convenience methods for any [`CacheBucket`].
///
/// Kept on an extension trait so [`CacheBucket`] stays object-safe and
/// implementors only deal with bytes.
///
/// ```
/// use tome_cache::{Cache, CacheBucketExt, NullCache};
///
/// let bucket = NullCache.bucket("models");
/// bucket.set_json("intro.md", "v1", &vec!["a", "b"]).unwrap();
/// let back: Option<Vec<String>> = bucket.get_json("intro.md", "v1");
/// assert!(back.is_none());
/// ```
pub trait CacheBucketExt: CacheBucket {
    /// Retrieve and deserialize a JSON value.
    ///
    /// Returns `None` on miss, etag mismatch, or if the stored bytes no longer
    /// deserialize into `T`.
    fn get_json<T: DeserializeOwned>(&self, key: &str, etag: &str) -> Option<T> {
        let bytes = self.get(key, etag)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    /// Serialize `value` as JSON and store it.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Serialize`] if `value` cannot be encoded and
    /// [`PersistError::Io`] if the bucket write fails.
    fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        etag: &str,
        value: &T,
    ) -> Result<(), PersistError> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, etag, &bytes)
    }
}

impl<B: CacheBucket + ?Sized> CacheBucketExt for B {}
