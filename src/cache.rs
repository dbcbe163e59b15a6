//! A small get-or-build cache used to keep compiled rule engines.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;

struct Entry<V> {
    value: V,
    last_used: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    clock: u64,
}

/// Thread-safe map from key to built value.
///
/// The lock is held while a missing value is built, so each key is built at
/// most once.
/// With a capacity, inserting into a full cache evicts the least recently used
/// entry; without one, entries stay until [`evict`](Self::evict) or
/// [`clear`](Self::clear).
pub struct Cache<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_entries: Option<usize>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// An unbounded cache.
    #[must_use]
    pub fn new() -> Self {
        Cache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
            max_entries: None,
        }
    }

    /// A cache holding at most `max_entries` values (at least one).
    #[must_use]
    pub fn with_capacity(max_entries: usize) -> Self {
        Cache {
            max_entries: Some(max_entries.max(1)),
            ..Cache::new()
        }
    }

    /// Return the cached value for `key`, building and storing it if absent.
    ///
    /// # Errors
    ///
    /// Returns the builder's error; nothing is cached in that case.
    pub fn get_or_build<E>(&self, key: K, build: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let now = inner.clock;
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.last_used = now;
            return Ok(entry.value.clone());
        }

        let value = build()?;
        if let Some(max) = self.max_entries {
            if inner.entries.len() >= max {
                let oldest = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    inner.entries.remove(&oldest);
                }
            }
        }
        inner.entries.insert(
            key,
            Entry {
                value: value.clone(),
                last_used: now,
            },
        );
        Ok(value)
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let now = inner.clock;
        inner.entries.get_mut(key).map(|e| {
            e.last_used = now;
            e.value.clone()
        })
    }

    /// Remove and return the entry for `key`.
    pub fn evict(&self, key: &K) -> Option<V> {
        self.inner.lock().entries.remove(key).map(|e| e.value)
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Cache::new()
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.inner.lock().entries.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
