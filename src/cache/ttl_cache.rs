//! TTL Cache Module
//!
//! Public facade: composes the table, the expiry queue and the eviction
//! scheduler behind `get`, `set` and `add`.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::cache::{CacheStats, StatsSnapshot, Table, Upsert};
use crate::config::{CacheConfig, EvictionStrategy};
use crate::error::{CacheError, Result};
use crate::tasks::{
    EvictionCallback, EvictionScheduler, ExpiryEvent, ExpiryQueue, Notifier, SchedulerContext,
};

// == TTL Cache ==
/// Size-bounded, TTL-expiring concurrent cache.
///
/// All operations take `&self`; share the cache across threads with `Arc`.
/// Expired entries are removed by a background task running on the tokio
/// runtime the cache was built on, and `on_evicted` is called once per removal.
///
/// # Example
/// ```no_run
/// use std::time::Duration;
/// use ttl_cache::{CacheConfig, TtlCache};
///
/// # #[tokio::main] async fn main() -> ttl_cache::error::Result<()> {
/// let config = CacheConfig::new(Duration::from_secs(30), 1_000);
/// let cache = TtlCache::new(config, |key: String, value| {
///     println!("{key} expired holding {value}");
/// })?;
///
/// cache.set("session".to_string(), 42)?;
/// assert_eq!(*cache.get(&"session".to_string())?, 42);
/// # Ok(()) }
/// ```
pub struct TtlCache<K, V> {
    table: Arc<Table<K, V>>,
    /// Present only for the queue strategy
    queue: Option<Arc<ExpiryQueue<K, V>>>,
    scheduler: EvictionScheduler,
    stats: Arc<CacheStats>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache on the current tokio runtime and starts its scheduler.
    ///
    /// # Errors
    /// - `NoRuntime` when called outside a tokio runtime
    /// - `InvalidConfig` when `config` fails validation
    pub fn new<F>(config: CacheConfig, on_evicted: F) -> Result<Self>
    where
        F: Fn(K, Arc<V>) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        Self::with_runtime(runtime, config, on_evicted)
    }

    /// Creates a cache whose background work runs on `runtime`.
    ///
    /// Usable from threads that are not part of any runtime.
    pub fn with_runtime<F>(runtime: Handle, config: CacheConfig, on_evicted: F) -> Result<Self>
    where
        F: Fn(K, Arc<V>) + Send + Sync + 'static,
    {
        config.validate()?;

        let table = Arc::new(Table::new(config.max_entries));
        let stats = Arc::new(CacheStats::new());
        let callback: EvictionCallback<K, V> = Arc::new(on_evicted);
        let context = SchedulerContext {
            table: Arc::clone(&table),
            stats: Arc::clone(&stats),
            notifier: Notifier::new(callback, runtime.clone(), Arc::clone(&stats)),
        };

        let (queue, scheduler) = match config.strategy {
            EvictionStrategy::Queue { capacity } => {
                let queue = Arc::new(ExpiryQueue::new(capacity));
                let scheduler = EvictionScheduler::start_queue(context, Arc::clone(&queue), &runtime);
                (Some(queue), scheduler)
            }
            EvictionStrategy::Sweep { interval } => {
                (None, EvictionScheduler::start_sweep(context, interval, &runtime))
            }
        };

        debug!(
            ttl_ms = config.ttl.as_millis() as u64,
            max_entries = config.max_entries,
            "Cache created"
        );

        Ok(Self {
            table,
            queue,
            scheduler,
            stats,
            ttl: config.ttl,
        })
    }

    // == Get ==
    /// Returns a shared view of the value stored for `key`.
    ///
    /// # Errors
    /// `KeyNotFound` if the key was never set or has been evicted.
    pub fn get(&self, key: &K) -> Result<Arc<V>> {
        match self.table.lookup(key) {
            Some(entry) => {
                self.stats.record_hit();
                Ok(entry.read())
            }
            None => {
                self.stats.record_miss();
                Err(CacheError::KeyNotFound)
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key`, inserting or overwriting, and resets its deadline.
    ///
    /// With a bounded expiry queue this may wait for a free slot; see
    /// [`EvictionStrategy::Queue`].
    ///
    /// # Errors
    /// - `SizeLimit` only when `key` is new and the cache is full
    /// - `QueueFull` when a bounded queue is full on a current-thread runtime
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.write(key, Arc::new(value), false, |_| {})
    }

    // == Add ==
    /// Stores `value` under `key` only if the key is absent.
    ///
    /// # Errors
    /// - `KeyExists` if the key is present, whatever its remaining TTL
    /// - `SizeLimit` if the cache is full
    /// - `QueueFull` when a bounded queue is full on a current-thread runtime
    pub fn add(&self, key: K, value: V) -> Result<()> {
        self.write(key, Arc::new(value), true, |_| {})
    }

    /// Shared write path. `before_update` runs after the table hands back an
    /// existing entry and before the value is written into it.
    fn write<H>(
        &self,
        key: K,
        value: Arc<V>,
        require_absent: bool,
        mut before_update: H,
    ) -> Result<()>
    where
        H: FnMut(&K),
    {
        // Claimed before the table changes so a rejected write leaves nothing behind
        let permit = match &self.queue {
            Some(queue) => Some(queue.reserve()?),
            None => None,
        };

        loop {
            let upserted = self
                .table
                .upsert(key.clone(), Arc::clone(&value), self.ttl, require_absent)
                .inspect_err(|err| match err {
                    CacheError::SizeLimit { .. } => self.stats.record_size_limit(),
                    CacheError::KeyExists => self.stats.record_exists(),
                    _ => {}
                })?;

            let (handle, version) = match upserted {
                Upsert::Inserted { handle, version } => {
                    self.stats.record_insert();
                    (handle, version)
                }
                Upsert::Existing(handle) => {
                    before_update(&key);
                    match handle.write(Arc::clone(&value), self.ttl) {
                        Some(version) => {
                            self.stats.record_update();
                            (handle, version)
                        }
                        // Evicted after the lookup; go through the table again
                        None => continue,
                    }
                }
            };

            if let Some(permit) = permit {
                let event = ExpiryEvent {
                    key,
                    handle: Arc::downgrade(&handle),
                    version,
                };
                if !permit.send(event) {
                    warn!("Cache is shut down; write will not be evicted");
                }
            }
            return Ok(());
        }
    }

    // == Introspection ==
    /// Returns the current number of live entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the maximum number of live entries.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the TTL applied to every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a snapshot of the cache counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.table.len())
    }

    /// Returns true while the eviction scheduler is alive.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }
}

impl<K, V> TtlCache<K, V> {
    // == Shutdown ==
    /// Stops the eviction scheduler. Idempotent.
    ///
    /// Callbacks already dispatched run to completion; no new evictions are
    /// scheduled. Reads and writes keep working against the table.
    pub fn shutdown(&self) {
        self.scheduler.stop();
        if let Some(queue) = &self.queue {
            queue.close();
        }
    }
}

impl<K, V> Drop for TtlCache<K, V> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<K, V> fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.table.capacity())
            .field("queue", &self.queue.is_some())
            .finish_non_exhaustive()
    }
}
