//! Background Tasks Module
//!
//! Contains the eviction machinery that runs alongside cache callers.
//!
//! # Tasks
//! - Eviction scheduler: removes expired entries (queue-driven or sweep)
//! - Notifier: dispatches eviction callbacks off the scheduler's path

mod notifier;
mod queue;
mod scheduler;

pub use notifier::{EvictionCallback, Notifier};
pub use queue::{ExpiryEvent, ExpiryQueue, SendPermit};
pub use scheduler::{EvictionScheduler, SchedulerContext};
