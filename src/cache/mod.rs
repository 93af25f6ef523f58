//! Cache Module
//!
//! Entry storage, the structural table, statistics and the public facade.

mod entry;
mod stats;
mod table;
mod ttl_cache;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{Entry, EntrySnapshot};
pub use stats::{CacheStats, StatsSnapshot};
pub use table::{EntryHandle, Table, Upsert};
pub use ttl_cache::TtlCache;
