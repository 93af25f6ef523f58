//! Cache Entry Module
//!
//! The unit of storage: a value, its absolute deadline and an update version,
//! all guarded by the entry's own lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

// == Entry Snapshot ==
/// Eviction-relevant metadata copied out of an entry under its shared lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Instant after which the entry may be removed
    pub deadline: Instant,
    /// Number of writes applied to this entry so far
    pub version: u64,
}

impl EntrySnapshot {
    /// Checks whether the deadline has been reached at `now`.
    ///
    /// Boundary condition: an entry whose deadline equals `now` is expired.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.deadline <= now
    }
}

#[derive(Debug)]
struct EntryState<V> {
    value: Arc<V>,
    deadline: Instant,
    version: u64,
    /// Set once the eviction path has unlinked the entry from the table
    removed: bool,
}

// == Cache Entry ==
/// A single cache entry.
///
/// The table owns entries through `Arc`; expiry events only hold `Weak`
/// handles, so an entry dies as soon as the table lets go of it.
#[derive(Debug)]
pub struct Entry<V> {
    state: RwLock<EntryState<V>>,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates an entry holding `value` at version 1, expiring `ttl` from now.
    pub fn new(value: Arc<V>, ttl: Duration) -> Self {
        Self {
            state: RwLock::new(EntryState {
                value,
                deadline: Instant::now() + ttl,
                version: 1,
                removed: false,
            }),
        }
    }

    // == Read ==
    /// Returns a shared view of the current value.
    pub fn read(&self) -> Arc<V> {
        Arc::clone(&self.state.read().value)
    }

    // == Write ==
    /// Replaces the value, pushes the deadline to `now + ttl` and bumps the version.
    ///
    /// Returns the new version, or `None` if the entry was already removed from
    /// the table. The caller must then re-insert through the table instead.
    pub fn write(&self, value: Arc<V>, ttl: Duration) -> Option<u64> {
        let mut state = self.state.write();
        if state.removed {
            return None;
        }
        state.value = value;
        state.deadline = Instant::now() + ttl;
        state.version += 1;
        Some(state.version)
    }

    // == Snapshot ==
    /// Copies out `(deadline, version)`, or `None` once the entry is removed.
    pub fn snapshot(&self) -> Option<EntrySnapshot> {
        let state = self.state.read();
        if state.removed {
            return None;
        }
        Some(EntrySnapshot {
            deadline: state.deadline,
            version: state.version,
        })
    }

    /// Marks the entry removed if `predicate` holds for its current metadata.
    ///
    /// Runs under the exclusive entry lock so no write can slip in between the
    /// check and the mark. Returns the value owned at removal time.
    pub(crate) fn mark_removed_if<F>(&self, predicate: F) -> Option<Arc<V>>
    where
        F: FnOnce(&EntrySnapshot) -> bool,
    {
        let mut state = self.state.write();
        if state.removed {
            return None;
        }
        let snapshot = EntrySnapshot {
            deadline: state.deadline,
            version: state.version,
        };
        if !predicate(&snapshot) {
            return None;
        }
        state.removed = true;
        Some(Arc::clone(&state.value))
    }
}
