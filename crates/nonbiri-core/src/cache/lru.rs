//! Thread-safe, fixed-capacity, string-keyed LRU cache.

use std::num::NonZeroUsize;

use parking_lot::RwLock;

/// A least-recently-used cache shared between threads.
///
/// `get` reorders recency and therefore takes the write lock, same as every
/// mutation. Only `has`, `peek` and `len` run under the shared lock.
pub struct LruCache<V> {
    inner: RwLock<::lru::LruCache<String, V>>,
    capacity: NonZeroUsize,
}

impl<V: Clone> LruCache<V> {
    /// Create a cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(::lru::LruCache::new(capacity)),
            capacity,
        }
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.write().get(key).cloned()
    }

    /// Look up `key` without touching recency.
    pub fn peek(&self, key: &str) -> Option<V> {
        self.inner.read().peek(key).cloned()
    }

    /// Insert or replace `key`, marking it most recently used.
    ///
    /// Returns the entry evicted to make room, if any.
    pub fn set(&self, key: impl Into<String>, value: V) -> Option<(String, V)> {
        let key = key.into();
        let mut inner = self.inner.write();
        match inner.push(key, value) {
            // `push` hands back the replaced value under the same key.
            Some((evicted, value)) if !inner.contains(&evicted) => Some((evicted, value)),
            _ => None,
        }
    }

    /// Whether `key` is present. Does not affect recency.
    pub fn has(&self, key: &str) -> bool {
        self.inner.read().contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.inner.write().pop(key)
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

impl<V> std::fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.inner.read().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
