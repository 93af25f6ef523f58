//! Configuration Module
//!
//! Construction parameters for the cache, loadable from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Defaults ==
const DEFAULT_TTL_MS: u64 = 60_000;
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

// == Eviction Strategy ==
/// How the background scheduler discovers expired entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionStrategy {
    /// One expiry-check event per write, consumed in write order.
    ///
    /// `capacity: None` keeps the queue unbounded; `Some(n)` makes writers
    /// wait once `n` events are pending.
    ///
    /// The worker only releases a slot when it takes the head event, and it
    /// holds each event until that event's deadline. A writer facing a full
    /// queue can therefore wait up to one whole `ttl`.
    ///
    /// Where the wait happens:
    /// - plain threads and blocking-pool threads park
    /// - multi-thread runtime workers wait inside `block_in_place`, so the
    ///   expiry worker and timers keep running
    /// - current-thread runtimes cannot wait without stalling the worker, so
    ///   the write fails with `QueueFull` and leaves the table untouched
    Queue { capacity: Option<usize> },
    /// Periodic randomized batch sweep of the key set every `interval`.
    Sweep { interval: Duration },
}

impl Default for EvictionStrategy {
    fn default() -> Self {
        EvictionStrategy::Queue { capacity: None }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Duration added to "now" to compute each write's deadline
    pub ttl: Duration,
    /// Maximum number of live entries
    pub max_entries: usize,
    /// Background eviction strategy
    pub strategy: EvictionStrategy,
}

impl CacheConfig {
    /// Creates a config with the given TTL and capacity, using the queue strategy.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            strategy: EvictionStrategy::default(),
        }
    }

    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_MS` - Entry TTL in milliseconds (default: 60000)
    /// - `CACHE_MAX_ENTRIES` - Maximum live entries (default: 10000)
    /// - `CACHE_EVICTION` - `queue` or `sweep` (default: queue)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweep period in milliseconds (default: 1000)
    /// - `CACHE_QUEUE_CAPACITY` - Bounded queue size, unset or 0 for unbounded
    pub fn from_env() -> Self {
        let ttl_ms = env_parse("CACHE_TTL_MS").unwrap_or(DEFAULT_TTL_MS);
        let max_entries = env_parse("CACHE_MAX_ENTRIES").unwrap_or(DEFAULT_MAX_ENTRIES);

        let strategy = match env::var("CACHE_EVICTION")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            Ok("sweep") => EvictionStrategy::Sweep {
                interval: Duration::from_millis(
                    env_parse("CACHE_SWEEP_INTERVAL_MS").unwrap_or(DEFAULT_SWEEP_INTERVAL_MS),
                ),
            },
            _ => EvictionStrategy::Queue {
                capacity: env_parse::<usize>("CACHE_QUEUE_CAPACITY").filter(|&c| c > 0),
            },
        };

        Self {
            ttl: Duration::from_millis(ttl_ms),
            max_entries,
            strategy,
        }
    }

    /// Switches to the queue strategy with an optional bound.
    pub fn with_queue(mut self, capacity: Option<usize>) -> Self {
        self.strategy = EvictionStrategy::Queue { capacity };
        self
    }

    /// Switches to the sweep strategy with the given period.
    pub fn with_sweep(mut self, interval: Duration) -> Self {
        self.strategy = EvictionStrategy::Sweep { interval };
        self
    }

    /// Rejects parameters the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(CacheError::InvalidConfig("ttl must be greater than zero".into()));
        }
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "max_entries must be greater than zero".into(),
            ));
        }
        match self.strategy {
            EvictionStrategy::Sweep { interval } if interval.is_zero() => Err(
                CacheError::InvalidConfig("sweep interval must be greater than zero".into()),
            ),
            EvictionStrategy::Queue { capacity: Some(0) } => Err(CacheError::InvalidConfig(
                "bounded queue capacity must be greater than zero".into(),
            )),
            _ => Ok(()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TTL_MS), DEFAULT_MAX_ENTRIES)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
