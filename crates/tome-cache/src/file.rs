//! File-backed persistence buckets.
//!
//! A bucket is a directory under the cache root; each key is one record:
//!
//! ```text
//! [etag_len: u32 LE][etag bytes][payload bytes]
//! ```
//!
//! Records are written to a sibling temp file and renamed into place, so a
//! reader never sees half a payload even while evictions run on other
//! threads.
//!
//! The root holds a `VERSION` marker. A missing or different marker wipes the
//! root before first use, so payloads from an incompatible build are never
//! read back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Cache, CacheBucket, PersistError};

const VERSION_FILE: &str = "VERSION";
const TEMP_SUFFIX: &str = ".partial";

/// Disk-backed [`Cache`].
///
/// ```text
/// {root}/
/// +-- VERSION
/// +-- models/            # bucket "models"
///     +-- 9f86d081...    # one record per key
/// ```
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Open a cache rooted at `root`, wiping it on version mismatch.
    ///
    /// A root that cannot be prepared is logged and left as is; writes to it
    /// then fail individually and reads miss.
    #[must_use]
    pub fn new(root: PathBuf, version: &str) -> Self {
        if let Err(e) = prepare_root(&root, version) {
            tracing::warn!(root = %root.display(), error = %e, "Cache root unusable");
        }
        Self { root }
    }

    /// Root directory of this cache.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Cache for FileCache {
    fn bucket(&self, name: &str) -> Box<dyn CacheBucket> {
        Box::new(FileBucket {
            dir: self.root.join(name),
        })
    }
}

struct FileBucket {
    dir: PathBuf,
}

impl FileBucket {
    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl CacheBucket for FileBucket {
    fn get(&self, key: &str, etag: &str) -> Option<Vec<u8>> {
        let record = fs::read(self.record_path(key)).ok()?;
        let (stored_etag, payload) = decode_record(&record)?;
        if !etag.is_empty() && stored_etag != etag.as_bytes() {
            tracing::trace!(key, "Cache record has a stale etag");
            return None;
        }
        Some(payload.to_vec())
    }

    fn set(&self, key: &str, etag: &str, value: &[u8]) -> Result<(), PersistError> {
        let path = self.record_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        fs::write(&temp, encode_record(etag, value)?)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(key, error = %e, "Failed to remove cache record"),
        }
    }
}

fn encode_record(etag: &str, value: &[u8]) -> io::Result<Vec<u8>> {
    let etag_len = u32::try_from(etag.len())
        .map_err(|_| io::Error::other("etag longer than u32::MAX bytes"))?;
    let mut record = Vec::with_capacity(4 + etag.len() + value.len());
    record.extend_from_slice(&etag_len.to_le_bytes());
    record.extend_from_slice(etag.as_bytes());
    record.extend_from_slice(value);
    Ok(record)
}

/// Split a record into etag and payload. `None` if it is truncated.
fn decode_record(record: &[u8]) -> Option<(&[u8], &[u8])> {
    let (len, rest) = record.split_first_chunk::<4>()?;
    let etag_len = usize::try_from(u32::from_le_bytes(*len)).ok()?;
    if rest.len() < etag_len {
        return None;
    }
    Some(rest.split_at(etag_len))
}

fn prepare_root(root: &Path, version: &str) -> io::Result<()> {
    let marker = root.join(VERSION_FILE);
    match fs::read_to_string(&marker) {
        Ok(stored) if stored == version => return Ok(()),
        Ok(stored) => {
            tracing::info!(root = %root.display(), %stored, version, "Cache version changed, wiping");
        }
        Err(_) => {
            tracing::info!(root = %root.display(), version, "Initializing cache");
        }
    }

    match fs::remove_dir_all(root) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(root)?;
    fs::write(marker, version)
}
