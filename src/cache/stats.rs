//! Cache Statistics Module
//!
//! Tracks cache activity: hits, misses, writes, rejections and evictions.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Lock-free counters shared by callers and the background scheduler.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    rejected_size_limit: AtomicU64,
    rejected_exists: AtomicU64,
    evictions: AtomicU64,
    stale_events: AtomicU64,
    callback_panics: AtomicU64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Recording ==
    /// Counts a `get` that found its key.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a `get` that found nothing.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a write that created a new entry.
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a write into an existing entry.
    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a write rejected by the capacity bound.
    pub fn record_size_limit(&self) {
        self.rejected_size_limit.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an `add` rejected because the key was present.
    pub fn record_exists(&self) {
        self.rejected_exists.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds `count` evictions.
    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// Counts an expiry event dropped because a newer write superseded it.
    pub fn record_stale_event(&self) {
        self.stale_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an eviction callback that panicked.
    pub fn record_callback_panic(&self) {
        self.callback_panics.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the counters into a serializable snapshot.
    ///
    /// Counters are read independently, so a snapshot taken under load is not
    /// a single consistent cut.
    pub fn snapshot(&self, total_entries: usize) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            rejected_size_limit: self.rejected_size_limit.load(Ordering::Relaxed),
            rejected_exists: self.rejected_exists.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
            total_entries,
        }
    }
}

// == Stats Snapshot ==
/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Number of successful `get` calls
    pub hits: u64,
    /// Number of `get` calls that found no entry
    pub misses: u64,
    /// Number of writes that created a new entry
    pub inserts: u64,
    /// Number of writes to an existing entry
    pub updates: u64,
    /// Writes rejected because the table was full
    pub rejected_size_limit: u64,
    /// `add` calls rejected because the key was present
    pub rejected_exists: u64,
    /// Entries removed after their deadline passed
    pub evictions: u64,
    /// Expiry events skipped because a later write superseded them
    pub stale_events: u64,
    /// Eviction callbacks that panicked
    pub callback_panics: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
