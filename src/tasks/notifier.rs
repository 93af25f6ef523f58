//! Eviction Notifier
//!
//! Hands evicted entries to the user callback without blocking the scheduler.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::error;

use crate::cache::CacheStats;

/// User function invoked after an entry is removed because it expired.
pub type EvictionCallback<K, V> = Arc<dyn Fn(K, Arc<V>) + Send + Sync>;

// == Notifier ==
/// Fire-and-forget dispatcher for eviction callbacks.
pub struct Notifier<K, V> {
    callback: EvictionCallback<K, V>,
    runtime: Handle,
    stats: Arc<CacheStats>,
}

impl<K, V> Clone for Notifier<K, V> {
    fn clone(&self) -> Self {
        Self {
            callback: Arc::clone(&self.callback),
            runtime: self.runtime.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<K, V> Notifier<K, V>
where
    K: Send + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(callback: EvictionCallback<K, V>, runtime: Handle, stats: Arc<CacheStats>) -> Self {
        Self {
            callback,
            runtime,
            stats,
        }
    }

    // == Notify ==
    /// Schedules one callback invocation on the blocking pool and returns immediately.
    ///
    /// A panicking callback is caught, logged and counted; it never reaches the caller.
    pub fn notify(&self, key: K, value: Arc<V>) {
        let callback = Arc::clone(&self.callback);
        let stats = Arc::clone(&self.stats);

        // The JoinHandle is dropped on purpose; nobody waits on callbacks
        self.runtime.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(key, value)));
            if let Err(payload) = outcome {
                stats.record_callback_panic();
                error!(reason = %panic_message(payload.as_ref()), "Eviction callback panicked");
            }
        });
    }

    /// Dispatches every `(key, value)` pair in `evicted`.
    pub fn notify_all(&self, evicted: Vec<(K, Arc<V>)>) {
        for (key, value) in evicted {
            self.notify(key, value);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
