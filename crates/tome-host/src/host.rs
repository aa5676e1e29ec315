//! Document host.
//!
//! [`DocumentHost`] owns the live set of [`FileModel`]s for one build session
//! and the bookkeeping derived from it: the uid index, the file identity map
//! and the set of known source files used for link resolution. All of that
//! sits behind one mutex. Rendering runs outside it on a snapshot of the
//! known files.
//!
//! Heavy per-model payloads live in a separate [`ModelCache`] with its own
//! lock. Cold payloads are written to a cache bucket when evicted and read
//! back on the next access.
//!
//! # Notifications
//!
//! Models do not call back into the host. Whoever mutates a model tells the
//! host explicitly:
//!
//! - [`DocumentHost::notify_uids_changed`] after `set_uids`
//! - [`DocumentHost::notify_file_changed`] after `set_file_and_type`
//! - [`DocumentHost::notify_content_accessed`] after reading a payload
//!
//! [`DocumentHost::update_uids`] and [`DocumentHost::retarget`] do the
//! mutation and the notification under the host lock in one step, which
//! keeps concurrent writers to the same model consistent.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use sha2::{Digest, Sha256};
use tome_cache::{
    Cache, CacheBucket, CacheBucketExt, DEFAULT_CAPACITY, EvictHandler, FileCache, ModelCache,
    NullCache,
};
use tome_config::Config;
use tome_sections::DEFAULT_REQUIRED_KEYS;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::markup::{MarkupResult, MarkupService, parse_html};
use crate::model::{DocumentKind, FileAndType, FileModel, UidDefinition};
use crate::uid_index::UidIndex;

/// Bucket holding evicted model payloads.
const CONTENT_BUCKET: &str = "models";

/// Construction options for [`DocumentHost`].
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Directory for persisted payloads.
    ///
    /// If `None`, evicted payloads are dropped.
    pub cache_dir: Option<PathBuf>,
    /// Application version for cache invalidation.
    pub version: String,
    /// Maximum resident payloads, `<= 0` for unbounded.
    pub capacity: i64,
    /// Header keys every overwrite section must declare.
    pub required_keys: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            version: env!("CARGO_PKG_VERSION").to_owned(),
            capacity: DEFAULT_CAPACITY,
            required_keys: DEFAULT_REQUIRED_KEYS.iter().map(|k| (*k).to_owned()).collect(),
        }
    }
}

impl From<&Config> for HostConfig {
    fn from(config: &Config) -> Self {
        let cache = &config.cache_resolved;
        Self {
            cache_dir: cache.enabled.then(|| cache.dir.clone()),
            capacity: cache.capacity,
            required_keys: config.build_resolved.required_keys.clone(),
            ..Self::default()
        }
    }
}

/// State guarded by the host lock.
struct HostIndex {
    models: Vec<Arc<FileModel>>,
    by_key: HashMap<String, Arc<FileModel>>,
    uids: UidIndex,
    file_map: HashMap<FileAndType, FileAndType>,
    known_files: Arc<HashSet<String>>,
    subscribed: bool,
}

impl HostIndex {
    fn load(models: impl IntoIterator<Item = Arc<FileModel>>) -> Self {
        let mut kept = Vec::new();
        let mut by_key = HashMap::new();
        let mut file_map = HashMap::new();
        let mut known_files = HashSet::new();

        for model in models {
            if by_key.contains_key(model.key()) {
                tracing::warn!(key = model.key(), "Duplicate model key, keeping the first");
                continue;
            }
            let current = model.file_and_type();
            if let Some(path) = current.working_folder_path() {
                known_files.insert(path);
            }
            if model.kind() != DocumentKind::Overwrite {
                file_map.insert(model.original_file_and_type().clone(), current);
            }
            by_key.insert(model.key().to_owned(), Arc::clone(&model));
            kept.push(model);
        }

        Self {
            uids: UidIndex::rebuild(&kept),
            models: kept,
            by_key,
            file_map,
            known_files: Arc::new(known_files),
            subscribed: true,
        }
    }

    /// The host's handle on `model`, if it is one of the live models.
    fn live(&self, model: &FileModel) -> Option<Arc<FileModel>> {
        if !self.subscribed {
            return None;
        }
        self.by_key
            .get(model.key())
            .filter(|live| std::ptr::eq(Arc::as_ptr(live), model))
            .map(Arc::clone)
    }
}

/// Registry of document models for one build session.
///
/// # Thread Safety
///
/// All methods take `&self`. Index reads and writes are serialized by one
/// mutex; the payload cache has its own lock, and markup runs unlocked.
pub struct DocumentHost {
    index: Mutex<HostIndex>,
    content: ModelCache<String, Arc<Value>>,
    bucket: Arc<dyn CacheBucket>,
    etag: String,
    markup: Arc<dyn MarkupService>,
    required_keys: Vec<String>,
}

impl DocumentHost {
    /// Create a host over `models`.
    ///
    /// # Arguments
    ///
    /// * `models` - Initial live models; later duplicates of a key are dropped
    /// * `markup` - Service rendering source text to HTML
    /// * `config` - Cache and validation options
    pub fn new(
        models: impl IntoIterator<Item = Arc<FileModel>>,
        markup: Arc<dyn MarkupService>,
        config: HostConfig,
    ) -> Self {
        let cache: Box<dyn Cache> = match &config.cache_dir {
            Some(dir) => Box::new(FileCache::new(dir.clone(), &config.version)),
            None => Box::new(NullCache),
        };
        let bucket: Arc<dyn CacheBucket> = Arc::from(cache.bucket(CONTENT_BUCKET));
        let etag = Uuid::new_v4().to_string();
        let content = ModelCache::new(
            config.capacity,
            persist_evicted(Arc::clone(&bucket), etag.clone()),
        );

        let index = HostIndex::load(models);
        tracing::info!(
            models = index.models.len(),
            capacity = config.capacity,
            "Document host loaded"
        );

        Self {
            index: Mutex::new(index),
            content,
            bucket,
            etag,
            markup,
            required_keys: config.required_keys,
        }
    }

    /// Replace the live models and rebuild every index from scratch.
    ///
    /// Payloads of models that are no longer present are discarded.
    pub fn reload(&self, models: impl IntoIterator<Item = Arc<FileModel>>) {
        let dropped: Vec<String> = {
            let mut index = self.lock();
            let previous = std::mem::replace(&mut *index, HostIndex::load(models));
            tracing::info!(models = index.models.len(), "Document host reloaded");
            previous
                .by_key
                .into_keys()
                .filter(|key| !index.by_key.contains_key(key))
                .collect()
        };

        for key in dropped {
            self.content.remove(&key);
            self.bucket.remove(&bucket_key(&key));
        }
    }

    /// Stop reacting to model notifications.
    ///
    /// Queries keep answering from the last state. [`DocumentHost::reload`]
    /// subscribes again.
    pub fn dispose(&self) {
        self.lock().subscribed = false;
        tracing::debug!("Document host disposed");
    }

    /// Apply a uid change that already happened on `model`.
    ///
    /// Only the difference between `old` and `new` touches the index.
    /// Notifications for models the host does not hold are ignored.
    pub fn notify_uids_changed(
        &self,
        model: &FileModel,
        old: &[UidDefinition],
        new: &[UidDefinition],
    ) {
        let mut index = self.lock();
        apply_uid_change(&mut index, model, old, new);
    }

    /// Replace the uids of `model` and update the index atomically.
    ///
    /// Returns the previous uids.
    pub fn update_uids(&self, model: &FileModel, uids: Vec<UidDefinition>) -> Vec<UidDefinition> {
        let mut index = self.lock();
        let new = uids.clone();
        let old = model.set_uids(uids);
        apply_uid_change(&mut index, model, &old, &new);
        old
    }

    /// Record the current file identity of `model`.
    ///
    /// Overwrite documents have no file identity of their own and are
    /// skipped.
    pub fn notify_file_changed(&self, model: &FileModel) {
        let mut index = self.lock();
        record_file_change(&mut index, model);
    }

    /// Move `model` to `file` and record the new identity atomically.
    ///
    /// Returns the previous identity.
    pub fn retarget(&self, model: &FileModel, file: FileAndType) -> FileAndType {
        let mut index = self.lock();
        let previous = model.set_file_and_type(file);
        record_file_change(&mut index, model);
        previous
    }

    /// Promote the payload of `model` in the content cache.
    pub fn notify_content_accessed(&self, model: &FileModel) {
        if !self.content.touch(model.key()) {
            tracing::trace!(key = model.key(), "Content access for non-resident payload");
        }
    }

    /// Store a modified payload for `key`.
    ///
    /// Returns the previous resident payload.
    pub fn set_content(&self, key: &str, value: Value) -> Option<Arc<Value>> {
        self.content.put(key.to_owned(), Arc::new(value))
    }

    /// Payload for `key`, reloading it from the bucket if it was evicted.
    ///
    /// The reload holds the content cache lock, so a concurrent
    /// [`DocumentHost::set_content`] is never shadowed by an older record.
    pub fn content(&self, key: &str) -> Option<Arc<Value>> {
        self.content.get_or_load(key, |key| {
            let value: Value = self.bucket.get_json(&bucket_key(key), &self.etag)?;
            tracing::debug!(key, "Reloaded evicted payload");
            Some(Arc::new(value))
        })
    }

    /// Number of payloads currently held in memory.
    #[must_use]
    pub fn resident_content(&self) -> usize {
        self.content.len()
    }

    /// Change the payload bound, evicting immediately if needed.
    pub fn set_cache_capacity(&self, capacity: i64) {
        self.content.set_capacity(capacity);
    }

    /// Every uid declared by a live model.
    #[must_use]
    pub fn get_all_uids(&self) -> BTreeSet<String> {
        self.lock().uids.uids()
    }

    /// Live models declaring `uid`, in declaration order. Empty if unknown.
    #[must_use]
    pub fn lookup_by_uid(&self, uid: &str) -> Vec<Arc<FileModel>> {
        self.lock().uids.lookup(uid)
    }

    /// Live models, optionally restricted to one kind.
    #[must_use]
    pub fn get_models(&self, kind: Option<DocumentKind>) -> Vec<Arc<FileModel>> {
        let index = self.lock();
        index
            .models
            .iter()
            .filter(|m| kind.is_none_or(|kind| m.kind() == kind))
            .map(Arc::clone)
            .collect()
    }

    /// Live model with the given key.
    #[must_use]
    pub fn model(&self, key: &str) -> Option<Arc<FileModel>> {
        self.lock().by_key.get(key).map(Arc::clone)
    }

    /// Current identity of a file known by its original identity.
    #[must_use]
    pub fn current_file(&self, original: &FileAndType) -> Option<FileAndType> {
        self.lock().file_map.get(original).cloned()
    }

    /// Snapshot of the working-folder paths links may resolve to.
    #[must_use]
    pub fn source_files(&self) -> Arc<HashSet<String>> {
        Arc::clone(&self.lock().known_files)
    }

    /// Replace the set of working-folder paths links may resolve to.
    ///
    /// By default it holds the current path of every live model. Paths are
    /// normalized to `~/` form; those climbing above the root are dropped.
    pub fn set_source_files(&self, files: impl IntoIterator<Item = String>) {
        let known: HashSet<String> = files
            .into_iter()
            .filter_map(|file| tome_sections::working_folder_path(&file))
            .collect();
        self.lock().known_files = Arc::new(known);
    }

    /// Header keys every overwrite section must declare.
    #[must_use]
    pub fn required_keys(&self) -> Vec<&str> {
        self.required_keys.iter().map(String::as_str).collect()
    }

    /// Render `text` and split it into link-resolved segments.
    ///
    /// Never fails: if rendering errors or panics, or splitting goes wrong, a
    /// warning is logged and the result is a single pass-through segment
    /// holding `text`.
    pub fn markup_multiple(&self, text: &str, file: &FileAndType) -> Vec<MarkupResult> {
        let known_files = self.source_files();
        match self.markup_core(text, file, &known_files) {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(file = %file.file, error = %e, "Markup failed, keeping raw text");
                vec![MarkupResult::passthrough(text)]
            }
        }
    }

    /// First segment of [`DocumentHost::markup_multiple`].
    pub fn markup(&self, text: &str, file: &FileAndType) -> MarkupResult {
        self.markup_multiple(text, file)
            .into_iter()
            .next()
            .unwrap_or_else(|| MarkupResult::passthrough(text))
    }

    fn markup_core(
        &self,
        text: &str,
        file: &FileAndType,
        known_files: &HashSet<String>,
    ) -> Result<Vec<MarkupResult>, PipelineError> {
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| self.markup.markup(text, file)))
            .map_err(|payload| PipelineError::Panicked(panic_message(&*payload)))?;
        Ok(parse_html(&rendered?, &file.file, known_files)?)
    }

    fn lock(&self) -> MutexGuard<'_, HostIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build-log passthroughs carrying source location fields.
#[allow(clippy::unused_self)]
impl DocumentHost {
    /// Log a verbose message about a source location.
    pub fn log_verbose(&self, message: &str, file: Option<&str>, line: Option<&str>) {
        tracing::debug!(file, line, "{message}");
    }

    /// Log an informational message about a source location.
    pub fn log_info(&self, message: &str, file: Option<&str>, line: Option<&str>) {
        tracing::info!(file, line, "{message}");
    }

    /// Log a warning about a source location.
    pub fn log_warning(&self, message: &str, file: Option<&str>, line: Option<&str>) {
        tracing::warn!(file, line, "{message}");
    }

    /// Log an error about a source location.
    pub fn log_error(&self, message: &str, file: Option<&str>, line: Option<&str>) {
        tracing::error!(file, line, "{message}");
    }
}

impl fmt::Debug for DocumentHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.lock();
        f.debug_struct("DocumentHost")
            .field("models", &index.models.len())
            .field("subscribed", &index.subscribed)
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}

fn apply_uid_change(
    index: &mut HostIndex,
    model: &FileModel,
    old: &[UidDefinition],
    new: &[UidDefinition],
) {
    let old: BTreeSet<&str> = old.iter().map(|uid| uid.name.as_str()).collect();
    let new: BTreeSet<&str> = new.iter().map(|uid| uid.name.as_str()).collect();
    if old == new {
        return;
    }
    let Some(live) = index.live(model) else {
        tracing::debug!(key = model.key(), "Ignoring uid change of a model the host does not hold");
        return;
    };
    index.uids.apply_diff(&live, &old, &new);
}

fn record_file_change(index: &mut HostIndex, model: &FileModel) {
    if model.kind() == DocumentKind::Overwrite {
        return;
    }
    if index.live(model).is_none() {
        tracing::debug!(key = model.key(), "Ignoring file change of a model the host does not hold");
        return;
    }

    let current = model.file_and_type();
    let previous = index
        .file_map
        .insert(model.original_file_and_type().clone(), current.clone());
    if previous.as_ref() == Some(&current) {
        return;
    }

    let known = Arc::make_mut(&mut index.known_files);
    if let Some(path) = previous.and_then(|p| p.working_folder_path()) {
        known.remove(&path);
    }
    if let Some(path) = current.working_folder_path() {
        known.insert(path);
    }
}

fn persist_evicted(bucket: Arc<dyn CacheBucket>, etag: String) -> EvictHandler<String, Arc<Value>> {
    Box::new(move |key, entry| {
        if !entry.dirty {
            return Ok(());
        }
        bucket.set_json(&bucket_key(key), &etag, &*entry.value)
    })
}

/// Bucket key for a model key. Model keys are paths and may not be valid
/// file names.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

fn bucket_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::error::MarkupError;

    static_assertions::assert_impl_all!(DocumentHost: Send, Sync);

    struct Echo;

    impl MarkupService for Echo {
        fn markup(&self, text: &str, _file: &FileAndType) -> Result<String, MarkupError> {
            Ok(text.to_owned())
        }
    }

    struct Failing(AtomicUsize);

    impl MarkupService for Failing {
        fn markup(&self, _text: &str, _file: &FileAndType) -> Result<String, MarkupError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(MarkupError::Failed("renderer unavailable".to_owned()))
        }
    }

    fn model(file: &str, kind: DocumentKind, uids: &[&str]) -> Arc<FileModel> {
        Arc::new(
            FileModel::new(FileAndType::new("/corpus", file, kind))
                .with_uids(uids.iter().map(|u| UidDefinition::new(*u))),
        )
    }

    fn host(models: Vec<Arc<FileModel>>) -> DocumentHost {
        DocumentHost::new(models, Arc::new(Echo), HostConfig::default())
    }

    fn keys(models: &[Arc<FileModel>]) -> Vec<&str> {
        models.iter().map(|m| m.key()).collect()
    }

    #[test]
    fn test_load_builds_indexes() {
        let a = model("a.md", DocumentKind::Conceptual, &["A"]);
        let o = model("o.md", DocumentKind::Overwrite, &["A", "O"]);
        let host = host(vec![Arc::clone(&a), Arc::clone(&o)]);

        assert_eq!(keys(&host.lookup_by_uid("A")), vec!["a.md", "o.md"]);
        assert_eq!(host.get_all_uids(), BTreeSet::from(["A".to_owned(), "O".to_owned()]));
        assert_eq!(
            host.current_file(a.original_file_and_type()),
            Some(a.file_and_type())
        );
        assert_eq!(host.current_file(o.original_file_and_type()), None);
        assert!(host.source_files().contains("~/a.md"));
        assert!(host.lookup_by_uid("missing").is_empty());
    }

    #[test]
    fn test_get_models_filters_by_kind() {
        let host = host(vec![
            model("a.md", DocumentKind::Conceptual, &[]),
            model("o.md", DocumentKind::Overwrite, &[]),
            model("toc.yml", DocumentKind::Toc, &[]),
        ]);

        assert_eq!(host.get_models(None).len(), 3);
        assert_eq!(keys(&host.get_models(Some(DocumentKind::Overwrite))), vec!["o.md"]);
        assert!(host.get_models(Some(DocumentKind::Resource)).is_empty());
    }

    #[test]
    fn test_duplicate_keys_keep_first() {
        let first = model("a.md", DocumentKind::Conceptual, &["A"]);
        let second = model("a.md", DocumentKind::Conceptual, &["B"]);
        let host = host(vec![Arc::clone(&first), second]);

        assert_eq!(host.get_models(None).len(), 1);
        assert!(host.lookup_by_uid("B").is_empty());
        assert!(Arc::ptr_eq(&host.model("a.md").unwrap(), &first));
    }

    #[test]
    fn test_uid_change_applies_diff() {
        let a = model("a.md", DocumentKind::Conceptual, &["A", "S"]);
        let b = model("b.md", DocumentKind::Conceptual, &["S"]);
        let host = host(vec![Arc::clone(&a), Arc::clone(&b)]);

        let old = a.set_uids(vec![UidDefinition::new("S"), UidDefinition::new("C")]);
        host.notify_uids_changed(&a, &old, &a.uids());

        assert!(host.lookup_by_uid("A").is_empty());
        assert_eq!(keys(&host.lookup_by_uid("C")), vec!["a.md"]);
        assert_eq!(keys(&host.lookup_by_uid("S")), vec!["a.md", "b.md"]);
        assert_eq!(
            host.get_all_uids(),
            BTreeSet::from(["C".to_owned(), "S".to_owned()])
        );
    }

    #[test]
    fn test_update_uids_returns_previous() {
        let a = model("a.md", DocumentKind::Conceptual, &["A"]);
        let host = host(vec![Arc::clone(&a)]);

        let old = host.update_uids(&a, Vec::new());
        assert_eq!(old, vec![UidDefinition::new("A")]);
        assert!(host.get_all_uids().is_empty());
    }

    #[test]
    fn test_notifications_for_foreign_model_ignored() {
        let a = model("a.md", DocumentKind::Conceptual, &["A"]);
        let impostor = model("a.md", DocumentKind::Conceptual, &["A"]);
        let host = host(vec![Arc::clone(&a)]);

        host.update_uids(&impostor, vec![UidDefinition::new("X")]);
        assert!(host.lookup_by_uid("X").is_empty());
        assert_eq!(keys(&host.lookup_by_uid("A")), vec!["a.md"]);
    }

    #[test]
    fn test_dispose_stops_notifications() {
        let a = model("a.md", DocumentKind::Conceptual, &["A"]);
        let host = host(vec![Arc::clone(&a)]);

        host.dispose();
        host.update_uids(&a, vec![UidDefinition::new("B")]);
        assert_eq!(keys(&host.lookup_by_uid("A")), vec!["a.md"]);
        assert!(host.lookup_by_uid("B").is_empty());

        host.reload(vec![Arc::clone(&a)]);
        assert_eq!(keys(&host.lookup_by_uid("B")), vec!["a.md"]);
        assert!(host.lookup_by_uid("A").is_empty());
    }

    #[test]
    fn test_retarget_updates_file_map_and_sources() {
        let a = model("a.md", DocumentKind::Conceptual, &[]);
        let o = model("o.md", DocumentKind::Overwrite, &[]);
        let host = host(vec![Arc::clone(&a), Arc::clone(&o)]);

        let moved = FileAndType::new("/corpus", "guide/a.md", DocumentKind::Conceptual);
        let previous = host.retarget(&a, moved.clone());

        assert_eq!(previous.file, "a.md");
        assert_eq!(host.current_file(a.original_file_and_type()), Some(moved));
        let sources = host.source_files();
        assert!(sources.contains("~/guide/a.md"));
        assert!(!sources.contains("~/a.md"));

        host.retarget(&o, FileAndType::new("/corpus", "x.md", DocumentKind::Overwrite));
        assert_eq!(host.current_file(o.original_file_and_type()), None);
    }

    #[test]
    fn test_reload_drops_old_content() {
        let a = model("a.md", DocumentKind::Conceptual, &["A"]);
        let b = model("b.md", DocumentKind::Conceptual, &["B"]);
        let host = host(vec![Arc::clone(&a), Arc::clone(&b)]);
        host.set_content("a.md", json!({"conceptual": "a"}));
        host.set_content("b.md", json!({"conceptual": "b"}));

        host.reload(vec![Arc::clone(&b)]);

        assert!(host.content("a.md").is_none());
        assert_eq!(*host.content("b.md").unwrap(), json!({"conceptual": "b"}));
        assert_eq!(host.get_all_uids(), BTreeSet::from(["B".to_owned()]));
        assert!(host.model("a.md").is_none());
    }

    #[test]
    fn test_evicted_content_reloads_from_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            capacity: 2,
            ..HostConfig::default()
        };
        let host = DocumentHost::new(Vec::new(), Arc::new(Echo), config);

        host.set_content("a.md", json!(1));
        host.set_content("b.md", json!(2));
        host.set_content("c.md", json!(3));
        assert_eq!(host.resident_content(), 2);

        assert_eq!(*host.content("a.md").unwrap(), json!(1));
        assert_eq!(host.resident_content(), 2);
        assert_eq!(*host.content("b.md").unwrap(), json!(2));
    }

    #[test]
    fn test_reload_never_shadows_concurrent_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            capacity: 1,
            ..HostConfig::default()
        };
        let host = DocumentHost::new(Vec::new(), Arc::new(Echo), config);
        host.set_content("a.md", json!(0));
        let done = std::sync::atomic::AtomicBool::new(false);

        let stale = std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    host.content("a.md");
                }
            });
            let stale = (1..=2000)
                .filter(|n| {
                    host.set_content("b.md", json!(n));
                    host.set_content("a.md", json!(n));
                    host.content("a.md").as_deref() != Some(&json!(n))
                })
                .count();
            done.store(true, Ordering::SeqCst);
            stale
        });
        assert_eq!(stale, 0);
    }

    #[test]
    fn test_evicted_content_lost_without_cache_dir() {
        let config = HostConfig {
            capacity: 1,
            ..HostConfig::default()
        };
        let host = DocumentHost::new(Vec::new(), Arc::new(Echo), config);

        host.set_content("a.md", json!(1));
        host.set_content("b.md", json!(2));

        assert!(host.content("a.md").is_none());
        assert_eq!(*host.content("b.md").unwrap(), json!(2));
    }

    #[test]
    fn test_content_access_promotes() {
        let a = model("a.md", DocumentKind::Conceptual, &[]);
        let config = HostConfig {
            capacity: 2,
            ..HostConfig::default()
        };
        let host = DocumentHost::new(vec![Arc::clone(&a)], Arc::new(Echo), config);

        host.set_content("a.md", json!("a"));
        host.set_content("b.md", json!("b"));
        host.notify_content_accessed(&a);
        host.set_content("c.md", json!("c"));

        assert!(host.content("a.md").is_some());
        assert!(host.content("b.md").is_none());
    }

    struct Panicking;

    impl MarkupService for Panicking {
        fn markup(&self, _text: &str, _file: &FileAndType) -> Result<String, MarkupError> {
            panic!("renderer bug");
        }
    }

    #[test]
    fn test_markup_panic_degrades() {
        let host = DocumentHost::new(Vec::new(), Arc::new(Panicking), HostConfig::default());
        let file = FileAndType::new("/corpus", "a.md", DocumentKind::Conceptual);

        let results = host.markup_multiple("# Title", &file);
        assert_eq!(results, vec![MarkupResult::passthrough("# Title")]);
        assert_eq!(host.markup("again", &file).html, "again");
    }

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(&*payload), "boom 1");
        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(&*payload), "static");
    }

    #[test]
    fn test_markup_failure_degrades() {
        let service = Arc::new(Failing(AtomicUsize::new(0)));
        let host = DocumentHost::new(
            Vec::new(),
            Arc::clone(&service) as Arc<dyn MarkupService>,
            HostConfig::default(),
        );
        let file = FileAndType::new("/corpus", "a.md", DocumentKind::Conceptual);

        let results = host.markup_multiple("# Title\n\n<b>raw</b>", &file);
        assert_eq!(results, vec![MarkupResult::passthrough("# Title\n\n<b>raw</b>")]);
        assert_eq!(host.markup("text", &file).html, "text");
        assert_eq!(service.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_split_failure_degrades() {
        let host = host(Vec::new());
        let file = FileAndType::new("/corpus", "a.md", DocumentKind::Overwrite);
        let text = r#"<yamlheader start="1">uid: A"#;

        let results = host.markup_multiple(text, &file);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].html, text);
        assert_eq!(results[0].metadata, None);
    }

    #[test]
    fn test_markup_resolves_against_source_files() {
        let host = host(vec![model("b.md", DocumentKind::Conceptual, &[])]);
        let file = FileAndType::new("/corpus", "a.md", DocumentKind::Conceptual);

        let result = host.markup(r#"<a href="b.md#top">b</a><a href="c.md">c</a>"#, &file);
        assert_eq!(
            result.html,
            r##"<a href="~/b.md" anchor="#top">b</a><a href="c.md">c</a>"##
        );
        assert_eq!(
            result.link_to_files.into_iter().collect::<Vec<_>>(),
            vec!["~/b.md", "~/c.md"]
        );

        host.set_source_files(["c.md".to_owned()]);
        let result = host.markup(r#"<a href="c.md">c</a>"#, &file);
        assert_eq!(result.html, r#"<a href="~/c.md">c</a>"#);
    }

    #[test]
    fn test_host_config_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default_with_base(dir.path());
        let options = HostConfig::from(&config);

        assert_eq!(options.capacity, DEFAULT_CAPACITY);
        assert_eq!(options.cache_dir, Some(config.cache_resolved.dir.clone()));
        assert_eq!(options.required_keys, vec!["uid".to_owned()]);
    }
}
