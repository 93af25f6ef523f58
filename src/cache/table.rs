//! Cache Table Module
//!
//! Key → entry mapping behind the structural lock, plus the capacity bound.
//!
//! Lock order: the structural lock is always taken before an entry lock, and
//! payload writes happen after the structural lock has been released.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::cache::{Entry, EntrySnapshot};
use crate::error::{CacheError, Result};

/// Shared handle to an entry owned by the table.
pub type EntryHandle<V> = Arc<Entry<V>>;

// == Upsert Outcome ==
/// Result of a successful [`Table::upsert`].
#[derive(Debug)]
pub enum Upsert<V> {
    /// A new entry was created already holding the value.
    Inserted { handle: EntryHandle<V>, version: u64 },
    /// The key exists; the caller writes into the entry after the structural
    /// lock is released.
    Existing(EntryHandle<V>),
}

#[derive(Debug)]
struct TableInner<K, V> {
    entries: HashMap<K, EntryHandle<V>>,
    /// Always equal to `entries.len()`; only changed with the map under the write guard
    count: usize,
}

// == Table ==
/// Key → entry mapping with a fixed capacity.
#[derive(Debug)]
pub struct Table<K, V> {
    inner: RwLock<TableInner<K, V>>,
    capacity: usize,
}

impl<K, V> Table<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    /// Creates an empty table holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(TableInner {
                entries: HashMap::new(),
                count: 0,
            }),
            capacity,
        }
    }

    // == Lookup ==
    /// Returns a handle to the entry for `key`, if present.
    ///
    /// The shared structural guard is dropped before the caller touches the entry.
    pub fn lookup(&self, key: &K) -> Option<EntryHandle<V>> {
        self.inner.read().entries.get(key).cloned()
    }

    // == Upsert ==
    /// Finds the entry for `key`, or inserts a new one holding `value`.
    ///
    /// # Errors
    /// - `KeyExists` if `require_absent` is set and the key is present
    /// - `SizeLimit` if the key is absent and the table is full
    ///
    /// Nothing is mutated when an error is returned.
    pub fn upsert(
        &self,
        key: K,
        value: Arc<V>,
        ttl: Duration,
        require_absent: bool,
    ) -> Result<Upsert<V>> {
        let mut inner = self.inner.write();

        if let Some(handle) = inner.entries.get(&key) {
            if require_absent {
                return Err(CacheError::KeyExists);
            }
            return Ok(Upsert::Existing(Arc::clone(handle)));
        }

        if inner.count >= self.capacity {
            return Err(CacheError::SizeLimit {
                max_entries: self.capacity,
            });
        }

        let handle = Arc::new(Entry::new(value, ttl));
        inner.entries.insert(key, Arc::clone(&handle));
        inner.count += 1;

        Ok(Upsert::Inserted { handle, version: 1 })
    }

    // == Remove If ==
    /// Removes `key` if its entry still satisfies `predicate`.
    ///
    /// The check and the removal happen under the exclusive structural lock
    /// and the entry's exclusive lock, so an entry refreshed after the caller
    /// made its decision is left alone. The predicate also receives the entry
    /// itself so callers can tell a re-created key from the one they inspected.
    /// Returns the value owned at removal time.
    pub fn remove_if<F>(&self, key: &K, predicate: F) -> Option<Arc<V>>
    where
        F: FnOnce(&Entry<V>, &EntrySnapshot) -> bool,
    {
        let mut inner = self.inner.write();
        let entry = inner.entries.get(key)?;
        let value = entry.mark_removed_if(|snapshot| predicate(entry, snapshot))?;
        inner.entries.remove(key);
        inner.count -= 1;
        Some(value)
    }

    // == Remove Expired Batch ==
    /// Removes every key in `keys` whose entry has expired at `now`.
    ///
    /// One exclusive structural guard covers the whole batch. Keys that are
    /// already gone are skipped.
    pub fn remove_expired_batch(&self, keys: &[K], now: Instant) -> Vec<(K, Arc<V>)> {
        let mut inner = self.inner.write();
        let mut removed = Vec::new();

        for key in keys {
            let value = match inner.entries.get(key) {
                Some(entry) => entry.mark_removed_if(|s| s.is_expired_at(now)),
                None => continue,
            };
            if let Some(value) = value {
                inner.entries.remove(key);
                inner.count -= 1;
                removed.push((key.clone(), value));
            }
        }

        removed
    }

    // == Keys ==
    /// Snapshots the current key set.
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().entries.keys().cloned().collect()
    }

}

impl<K, V> Table<K, V> {
    // == Length ==
    /// Returns the current number of live entries.
    pub fn len(&self) -> usize {
        self.inner.read().count
    }

    // == Is Empty ==
    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Capacity ==
    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
