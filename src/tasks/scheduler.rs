//! Eviction Scheduler
//!
//! Background worker that removes expired entries from the table. Two
//! strategies share one contract: an entry whose latest deadline is still in
//! the future is never removed, and every removal notifies exactly once.
//!
//! - Queue: consume one expiry event per write, in write order. A version
//!   mismatch marks the event stale; the newer event behind it takes over.
//! - Sweep: every tick, shuffle the key set and check it in bounded batches,
//!   stopping early once a batch comes back mostly fresh.

use std::hash::Hash;
use std::ptr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::cache::{CacheStats, Table};
use crate::tasks::notifier::Notifier;
use crate::tasks::queue::{ExpiryEvent, ExpiryQueue};

/// Smallest number of keys checked per sweep batch.
const MIN_SWEEP_BATCH: usize = 100;

/// A batch with fewer than 1 in `SWEEP_CONTINUE_RATIO` keys expired ends the tick (20%).
const SWEEP_CONTINUE_RATIO: usize = 5;

/// Everything a worker needs from the cache.
pub struct SchedulerContext<K, V> {
    pub table: Arc<Table<K, V>>,
    pub stats: Arc<CacheStats>,
    pub notifier: Notifier<K, V>,
}

// == Eviction Scheduler ==
/// Handle to the running eviction worker.
///
/// Stopping is cooperative: the worker observes the signal at its next wait.
#[derive(Debug)]
pub struct EvictionScheduler {
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl EvictionScheduler {
    /// Starts the queue-driven worker on `runtime`.
    pub fn start_queue<K, V>(
        context: SchedulerContext<K, V>,
        queue: Arc<ExpiryQueue<K, V>>,
        runtime: &Handle,
    ) -> Self
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = runtime.spawn(expiry_loop(context, queue, shutdown_rx));

        info!("Queue-driven eviction scheduler started");

        Self {
            shutdown_tx,
            worker,
        }
    }

    /// Starts the periodic sweep worker on `runtime`.
    pub fn start_sweep<K, V>(
        context: SchedulerContext<K, V>,
        interval: Duration,
        runtime: &Handle,
    ) -> Self
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = runtime.spawn(sweep_loop(context, interval, shutdown_rx));

        info!(
            interval_ms = interval.as_millis() as u64,
            "Sweep eviction scheduler started"
        );

        Self {
            shutdown_tx,
            worker,
        }
    }

    /// Signals the worker to stop. Safe to call more than once.
    pub fn stop(&self) {
        let already_stopped = self.shutdown_tx.send_replace(true);
        if !already_stopped {
            info!("Eviction scheduler stopping");
        }
    }

    /// Returns true while the worker task is alive.
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}

/// Resolves once shutdown is requested or the scheduler handle is gone.
async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

// == Queue Strategy ==
async fn expiry_loop<K, V>(
    context: SchedulerContext<K, V>,
    queue: Arc<ExpiryQueue<K, V>>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = stopped(&mut shutdown_rx) => break,
            event = queue.pop() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if !process_event(&context, event, &mut shutdown_rx).await {
            break;
        }
    }

    debug!("Queue-driven eviction scheduler exited");
}

/// Handles one expiry event. Returns false if shutdown interrupted it.
async fn process_event<K, V>(
    context: &SchedulerContext<K, V>,
    event: ExpiryEvent<K, V>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    loop {
        // No strong reference is held across the sleep below
        let snapshot = match event.handle.upgrade().and_then(|entry| entry.snapshot()) {
            Some(snapshot) => snapshot,
            None => {
                trace!("Expiry event for a removed entry dropped");
                context.stats.record_stale_event();
                return true;
            }
        };

        if snapshot.version != event.version {
            trace!(
                event_version = event.version,
                entry_version = snapshot.version,
                "Stale expiry event dropped"
            );
            context.stats.record_stale_event();
            return true;
        }

        if !snapshot.is_expired_at(Instant::now()) {
            // FIFO order with a constant TTL puts the earliest pending deadline at the head
            tokio::select! {
                biased;
                _ = stopped(shutdown_rx) => return false,
                _ = tokio::time::sleep_until(snapshot.deadline.into()) => continue,
            }
        }

        let target = event.handle.as_ptr();
        let removed = context.table.remove_if(&event.key, |entry, current| {
            ptr::eq(entry, target)
                && current.version == event.version
                && current.is_expired_at(Instant::now())
        });

        match removed {
            Some(value) => {
                context.stats.record_evictions(1);
                context.notifier.notify(event.key, value);
            }
            // Refreshed between the snapshot and the delete; its newer event is queued
            None => context.stats.record_stale_event(),
        }
        return true;
    }
}

// == Sweep Strategy ==
async fn sweep_loop<K, V>(
    context: SchedulerContext<K, V>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut shutdown_rx) => break,
            _ = ticker.tick() => {}
        }

        let removed = sweep_once(&context);
        if removed > 0 {
            debug!(
                removed = removed,
                keys_remaining = context.table.len(),
                "Sweep removed expired entries"
            );
        } else {
            trace!("Sweep found no expired entries");
        }
    }

    debug!("Sweep eviction scheduler exited");
}

/// Runs one randomized sweep over the table. Returns the number of removals.
pub(crate) fn sweep_once<K, V>(context: &SchedulerContext<K, V>) -> usize
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let mut keys = context.table.keys();
    if keys.is_empty() {
        return 0;
    }
    keys.shuffle(&mut rand::rng());

    let batch_size = sweep_batch_size(keys.len());
    let mut total_removed = 0;

    for batch in keys.chunks(batch_size) {
        let removed = context.table.remove_expired_batch(batch, Instant::now());
        let expired = removed.len();

        total_removed += expired;
        context.stats.record_evictions(expired as u64);
        context.notifier.notify_all(removed);

        if expired * SWEEP_CONTINUE_RATIO < batch.len() {
            break;
        }
    }

    total_removed
}

/// `max(total / 100, 100)`, never more than `total`.
fn sweep_batch_size(total: usize) -> usize {
    (total / 100).max(MIN_SWEEP_BATCH).min(total).max(1)
}
