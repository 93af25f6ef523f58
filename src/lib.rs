//! TTL Cache - A size-bounded, TTL-expiring concurrent key-value cache
//!
//! Embeds in a service process: many threads read and write through `&self`
//! while a background task evicts expired entries and reports them through a
//! user callback.

pub mod cache;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{StatsSnapshot, TtlCache};
pub use config::{CacheConfig, EvictionStrategy};
pub use error::{CacheError, Result};
