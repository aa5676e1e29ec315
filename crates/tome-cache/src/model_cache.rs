//! Bounded least-recently-used cache with serialize-on-evict.
//!
//! [`ModelCache`] keeps at most `capacity` entries resident. Whenever an
//! insert or a capacity change pushes it over the bound, the coldest entries
//! are popped one at a time and handed to the [`EvictHandler`] before their
//! payload is dropped. A failing handler is logged and ignored: the bound
//! always wins over persistence.
//!
//! Ordering is delegated to [`lru::LruCache`] running unbounded, so eviction
//! stays under our control and every popped entry passes through the
//! handler exactly once.

use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lru::LruCache;

use crate::PersistError;

/// Default resident-entry bound (0xC00).
pub const DEFAULT_CAPACITY: i64 = 0xC00;

/// Callback invoked for each evicted entry before its payload is dropped.
///
/// Runs while the cache lock is held; it must not call back into the same
/// cache.
pub type EvictHandler<K, V> =
    Box<dyn Fn(&K, &CacheEntry<V>) -> Result<(), PersistError> + Send + Sync>;

/// A resident cache payload together with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached payload.
    pub value: V,
    /// Access sequence number. Monotonic per cache, not wall clock.
    pub last_access: u64,
    /// Whether the payload changed since it was last persisted.
    pub dirty: bool,
}

struct State<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    capacity: Option<NonZeroUsize>,
    clock: u64,
}

impl<K: Hash + Eq, V> State<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Thread-safe bounded LRU cache.
///
/// Mutations (including `get`, which reorders) take the write lock;
/// [`ModelCache::contains`] and the size queries only take the read lock.
pub struct ModelCache<K: Hash + Eq, V> {
    state: RwLock<State<K, V>>,
    on_evict: EvictHandler<K, V>,
}

impl<K, V> ModelCache<K, V>
where
    K: Hash + Eq + fmt::Debug,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A `capacity` of zero or less disables bounding.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum resident entries, `<= 0` for unbounded
    /// * `on_evict` - Persists an entry before it leaves memory
    #[must_use]
    pub fn new(capacity: i64, on_evict: EvictHandler<K, V>) -> Self {
        Self {
            state: RwLock::new(State {
                entries: LruCache::unbounded(),
                capacity: to_capacity(capacity),
                clock: 0,
            }),
            on_evict,
        }
    }

    /// Create an unbounded cache whose evictions are no-ops.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(0, Box::new(|_, _| Ok(())))
    }

    /// Resident-only existence check. Does not promote.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.read().entries.contains(key)
    }

    /// Fetch a clone of the resident payload, promoting it to most recent.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let mut state = self.write();
        let stamp = state.tick();
        let entry = state.entries.get_mut(key)?;
        entry.last_access = stamp;
        Some(entry.value.clone())
    }

    /// Promote an entry without reading it.
    ///
    /// Returns `false` if the key is not resident.
    pub fn touch<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut state = self.write();
        let stamp = state.tick();
        match state.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = stamp;
                true
            }
            None => false,
        }
    }

    /// Insert or replace a modified payload, evicting if over capacity.
    ///
    /// Returns the previous payload for `key`. Replacing a key is not an
    /// eviction and does not reach the handler.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        self.insert(key, value, true)
    }

    /// Insert a payload that already matches persistent storage, unless the
    /// key is resident.
    ///
    /// Returns the payload left resident. A resident entry, clean or dirty,
    /// is kept and promoted; `value` is dropped in that case.
    pub fn admit(&self, key: K, value: V) -> V
    where
        V: Clone,
    {
        let mut state = self.write();
        let stamp = state.tick();
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.last_access = stamp;
            return entry.value.clone();
        }
        self.admit_locked(&mut state, key, value, stamp)
    }

    /// Resident payload for `key`, or the one produced by `load`, admitted
    /// clean.
    ///
    /// `load` runs under the write lock, so no `put` or eviction of any key
    /// interleaves with it. Like the evict handler, it must not call back
    /// into the same cache.
    pub fn get_or_load<Q, F>(&self, key: &Q, load: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        V: Clone,
        F: FnOnce(&Q) -> Option<V>,
    {
        let mut state = self.write();
        let stamp = state.tick();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access = stamp;
            return Some(entry.value.clone());
        }
        let value = load(key)?;
        Some(self.admit_locked(&mut state, key.to_owned(), value, stamp))
    }

    /// Drop an entry without calling the eviction handler.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.write().entries.pop(key).map(|entry| entry.value)
    }

    /// Change the bound, evicting down to it immediately.
    pub fn set_capacity(&self, capacity: i64) {
        let mut state = self.write();
        state.capacity = to_capacity(capacity);
        self.evict_overflow(&mut state);
    }

    /// Current bound, `None` when unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.read().capacity
    }

    /// Number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Whether no entry is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident keys from most to least recently used.
    #[must_use]
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.read().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    fn insert(&self, key: K, value: V, dirty: bool) -> Option<V> {
        let mut state = self.write();
        let stamp = state.tick();
        let entry = CacheEntry {
            value,
            last_access: stamp,
            dirty,
        };
        let previous = state.entries.put(key, entry).map(|old| old.value);
        self.evict_overflow(&mut state);
        previous
    }

    fn admit_locked(&self, state: &mut State<K, V>, key: K, value: V, stamp: u64) -> V
    where
        V: Clone,
    {
        let entry = CacheEntry {
            value: value.clone(),
            last_access: stamp,
            dirty: false,
        };
        state.entries.put(key, entry);
        self.evict_overflow(state);
        value
    }

    fn evict_overflow(&self, state: &mut State<K, V>) {
        let Some(capacity) = state.capacity else {
            return;
        };
        while state.entries.len() > capacity.get() {
            let Some((key, entry)) = state.entries.pop_lru() else {
                break;
            };
            match (self.on_evict)(&key, &entry) {
                Ok(()) => tracing::debug!(key = ?key, "evicted cache entry"),
                Err(e) => {
                    tracing::warn!(key = ?key, error = %e, "failed to persist evicted cache entry");
                }
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State<K, V>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State<K, V>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Hash + Eq, V> fmt::Debug for ModelCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ModelCache")
            .field("len", &state.entries.len())
            .field("capacity", &state.capacity)
            .finish_non_exhaustive()
    }
}

fn to_capacity(capacity: i64) -> Option<NonZeroUsize> {
    usize::try_from(capacity).ok().and_then(NonZeroUsize::new)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    static_assertions::assert_impl_all!(ModelCache<String, String>: Send, Sync);

    fn recording(capacity: i64) -> (ModelCache<String, i32>, Arc<Mutex<Vec<String>>>) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let cache = ModelCache::new(
            capacity,
            Box::new(move |key: &String, _entry: &CacheEntry<i32>| {
                sink.lock().unwrap().push(key.clone());
                Ok(())
            }),
        );
        (cache, evicted)
    }

    #[test]
    fn test_put_and_get() {
        let (cache, _) = recording(4);
        assert_eq!(cache.put("a".to_owned(), 1), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_capacity_bound_holds() {
        let (cache, evicted) = recording(3);
        for i in 0..10 {
            cache.put(format!("k{i}"), i);
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(evicted.lock().unwrap().len(), 7);
        assert!(!cache.contains("k0"));
        assert!(cache.contains("k9"));
    }

    #[test]
    fn test_each_eviction_calls_handler_once() {
        let (cache, evicted) = recording(2);
        for i in 0..6 {
            cache.put(format!("k{i}"), i);
        }
        let evicted = evicted.lock().unwrap().clone();
        assert_eq!(evicted, vec!["k0", "k1", "k2", "k3"]);
    }

    #[test]
    fn test_get_promotes_entry() {
        let (cache, evicted) = recording(2);
        cache.put("a".to_owned(), 1);
        cache.put("b".to_owned(), 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.put("c".to_owned(), 3);

        assert_eq!(*evicted.lock().unwrap(), vec!["b"]);
        assert!(cache.contains("a"));
        assert_eq!(cache.keys(), vec!["c", "a"]);
    }

    #[test]
    fn test_touch_promotes_entry() {
        let (cache, evicted) = recording(2);
        cache.put("a".to_owned(), 1);
        cache.put("b".to_owned(), 2);
        assert!(cache.touch("a"));
        assert!(!cache.touch("missing"));
        cache.put("c".to_owned(), 3);

        assert_eq!(*evicted.lock().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_contains_does_not_promote() {
        let (cache, evicted) = recording(2);
        cache.put("a".to_owned(), 1);
        cache.put("b".to_owned(), 2);
        assert!(cache.contains("a"));
        cache.put("c".to_owned(), 3);

        assert_eq!(*evicted.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_replace_is_not_eviction() {
        let (cache, evicted) = recording(1);
        cache.put("a".to_owned(), 1);
        assert_eq!(cache.put("a".to_owned(), 2), Some(1));
        assert_eq!(cache.get("a"), Some(2));
        assert!(evicted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handler_failure_still_evicts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache: ModelCache<String, i32> = ModelCache::new(
            1,
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PersistError::Io(std::io::Error::other("disk full")))
            }),
        );

        cache.put("a".to_owned(), 1);
        cache.put("b".to_owned(), 2);
        assert!(!cache.contains("a"));
        assert_eq!(cache.len(), 1);

        cache.put("c".to_owned(), 3);
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dirty_flag_reaches_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cache: ModelCache<String, i32> = ModelCache::new(
            1,
            Box::new(move |key, entry| {
                sink.lock().unwrap().push((key.clone(), entry.dirty));
                Ok(())
            }),
        );

        cache.admit("clean".to_owned(), 1);
        cache.put("dirty".to_owned(), 2);
        cache.put("last".to_owned(), 3);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("clean".to_owned(), false), ("dirty".to_owned(), true)]
        );
    }

    #[test]
    fn test_admit_keeps_resident_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cache: ModelCache<String, i32> = ModelCache::new(
            2,
            Box::new(move |key, entry| {
                sink.lock().unwrap().push((key.clone(), entry.value, entry.dirty));
                Ok(())
            }),
        );

        cache.put("a".to_owned(), 2);
        assert_eq!(cache.admit("a".to_owned(), 1), 2);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.admit("b".to_owned(), 7), 7);

        cache.put("c".to_owned(), 3);
        cache.put("d".to_owned(), 4);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a".to_owned(), 2, true), ("b".to_owned(), 7, false)]
        );
    }

    #[test]
    fn test_get_or_load_only_loads_on_miss() {
        let (cache, _) = recording(4);
        let loads = AtomicUsize::new(0);
        let load = |key: &str| {
            loads.fetch_add(1, Ordering::SeqCst);
            (key == "stored").then_some(5)
        };

        assert_eq!(cache.get_or_load("stored", load), Some(5));
        assert_eq!(cache.get_or_load("stored", load), Some(5));
        assert_eq!(cache.get_or_load("missing", load), None);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(cache.contains("stored"));
        assert!(!cache.contains("missing"));

        cache.put("fresh".to_owned(), 1);
        assert_eq!(cache.get_or_load("fresh", |_| Some(0)), Some(1));
    }

    #[test]
    fn test_non_positive_capacity_is_unbounded() {
        for capacity in [0, -1, i64::MIN] {
            let (cache, evicted) = recording(capacity);
            for i in 0..100 {
                cache.put(format!("k{i}"), i);
            }
            assert_eq!(cache.len(), 100);
            assert_eq!(cache.capacity(), None);
            assert!(evicted.lock().unwrap().is_empty());
        }
    }

    #[test]
    fn test_set_capacity_shrinks() {
        let (cache, evicted) = recording(0);
        for i in 0..5 {
            cache.put(format!("k{i}"), i);
        }
        cache.set_capacity(2);

        assert_eq!(cache.len(), 2);
        assert_eq!(*evicted.lock().unwrap(), vec!["k0", "k1", "k2"]);
        assert_eq!(cache.capacity(), NonZeroUsize::new(2));
    }

    #[test]
    fn test_remove_skips_handler() {
        let (cache, evicted) = recording(2);
        cache.put("a".to_owned(), 1);
        assert_eq!(cache.remove("a"), Some(1));
        assert!(cache.is_empty());
        assert!(evicted.lock().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_puts_respect_bound() {
        let (cache, evicted) = recording(16);

        std::thread::scope(|s| {
            for t in 0..8 {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..100 {
                        cache.put(format!("t{t}-{i}"), i);
                        cache.get(&format!("t{t}-{}", i / 2));
                    }
                });
            }
        });

        assert_eq!(cache.len(), 16);
        assert_eq!(evicted.lock().unwrap().len(), 800 - 16);
    }

    #[test]
    fn test_access_stamps_increase() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cache: ModelCache<String, i32> = ModelCache::new(
            1,
            Box::new(move |_, entry| {
                sink.lock().unwrap().push(entry.last_access);
                Ok(())
            }),
        );
        cache.put("a".to_owned(), 1);
        cache.get("a");
        cache.put("b".to_owned(), 2);
        cache.put("c".to_owned(), 3);

        let stamps = seen.lock().unwrap().clone();
        assert_eq!(stamps.len(), 2);
        assert!(stamps[0] < stamps[1]);
    }
}
