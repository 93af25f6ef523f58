//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Every variant is an ordinary outcome the caller decides on; the cache never
/// retries internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Key is absent, either never set or already evicted
    #[error("Key not found")]
    KeyNotFound,

    /// A brand-new key was written while the table is full
    #[error("Size limit reached: cache holds at most {max_entries} entries")]
    SizeLimit { max_entries: usize },

    /// `add` was called for a key that is already present
    #[error("Key already exists")]
    KeyExists,

    /// Construction parameters were rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bounded expiry queue is full and the writer runs on a current-thread
    /// runtime, where waiting would stall the only thread that drains it
    #[error("Expiry queue full: {capacity} events pending")]
    QueueFull { capacity: usize },

    /// The cache was built outside a tokio runtime
    #[error("No tokio runtime available to run the eviction scheduler")]
    NoRuntime,
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
