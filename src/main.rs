//! TTL Cache soak runner
//!
//! Drives an embedded cache with concurrent writers and readers, then prints
//! its statistics as JSON. Configured through the same environment variables
//! as `CacheConfig::from_env`, plus `SOAK_SECONDS`, `SOAK_KEYS` and
//! `SOAK_WRITE_PAUSE_US`.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ttl_cache::{CacheConfig, CacheError, TtlCache};

const WRITERS: usize = 4;
const READERS: usize = 4;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ttl_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        ttl_ms = config.ttl.as_millis() as u64,
        max_entries = config.max_entries,
        strategy = ?config.strategy,
        "Configuration loaded"
    );

    let soak_seconds: u64 = env_or("SOAK_SECONDS", 5);
    let key_space: usize = env_or("SOAK_KEYS", config.max_entries).max(1);
    // Paces writers so an unbounded expiry queue stays within reasonable memory
    let write_pause = Duration::from_micros(env_or("SOAK_WRITE_PAUSE_US", 10));

    let cache: Arc<TtlCache<String, u64>> = Arc::new(
        TtlCache::new(config, |_key, _value| {}).context("failed to build cache")?,
    );
    let stop = Arc::new(AtomicBool::new(false));

    let mut workers = Vec::new();
    for w in 0..WRITERS {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        workers.push(tokio::task::spawn_blocking(move || {
            let mut n = w;
            while !stop.load(Ordering::Relaxed) {
                match cache.set(format!("key-{}", n % key_space), n as u64) {
                    Ok(()) | Err(CacheError::SizeLimit { .. }) => {}
                    Err(err) => warn!(error = %err, "Unexpected write failure"),
                }
                n += WRITERS;
                std::thread::sleep(write_pause);
            }
        }));
    }
    for r in 0..READERS {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        workers.push(tokio::task::spawn_blocking(move || {
            let mut n = r;
            while !stop.load(Ordering::Relaxed) {
                let _ = cache.get(&format!("key-{}", n % key_space));
                n += READERS;
            }
        }));
    }
    info!(writers = WRITERS, readers = READERS, soak_seconds, "Soak started");

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(soak_seconds)) => {}
        _ = signal::ctrl_c() => info!("Received Ctrl+C, stopping early..."),
    }

    stop.store(true, Ordering::Relaxed);
    for worker in workers {
        worker.await.context("soak worker panicked")?;
    }

    cache.shutdown();
    let stats = cache.stats();
    info!(hit_rate = stats.hit_rate(), "Soak complete");
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
