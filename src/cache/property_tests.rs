//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the cache's behaviour over arbitrary operation sequences.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::cache::TtlCache;
use crate::config::CacheConfig;
use crate::error::CacheError;

// == Test Configuration ==
const TEST_MAX_ENTRIES: usize = 100;
const TEST_TTL: Duration = Duration::from_secs(300);

/// One runtime shared by every case; the cache only needs a handle to it.
fn runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| Runtime::new().expect("failed to build test runtime"))
}

fn new_cache(max_entries: usize) -> TtlCache<String, String> {
    TtlCache::with_runtime(
        runtime().handle().clone(),
        CacheConfig::new(TEST_TTL, max_entries),
        |_: String, _: Arc<String>| {},
    )
    .unwrap()
}

// == Strategies ==
/// Generates cache keys
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,16}".prop_map(|s| s)
}

/// Generates cache values
fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,64}".prop_map(|s| s)
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Add { key: String, value: String },
    Get { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Add { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Round-trip: set(k, v) followed by get(k) returns v.
    #[test]
    fn prop_roundtrip_storage(key in key_strategy(), value in value_strategy()) {
        let cache = new_cache(TEST_MAX_ENTRIES);

        cache.set(key.clone(), value.clone()).unwrap();

        let retrieved = cache.get(&key).unwrap();
        prop_assert_eq!(retrieved.as_str(), value.as_str(), "Round-trip value mismatch");
    }

    // Overwrite: the last set wins and the key is counted once.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        value1 in value_strategy(),
        value2 in value_strategy()
    ) {
        let cache = new_cache(TEST_MAX_ENTRIES);

        cache.set(key.clone(), value1).unwrap();
        cache.set(key.clone(), value2.clone()).unwrap();

        let stored = cache.get(&key).unwrap();
        prop_assert_eq!(stored.as_str(), value2.as_str());
        prop_assert_eq!(cache.len(), 1, "Should have exactly one entry after overwrite");
    }

    // Add: a second add fails with KeyExists and keeps the first value.
    #[test]
    fn prop_add_keeps_first_value(
        key in key_strategy(),
        value1 in value_strategy(),
        value2 in value_strategy()
    ) {
        let cache = new_cache(TEST_MAX_ENTRIES);

        cache.add(key.clone(), value1.clone()).unwrap();
        prop_assert_eq!(cache.add(key.clone(), value2), Err(CacheError::KeyExists));
        let stored = cache.get(&key).unwrap();
        prop_assert_eq!(stored.as_str(), value1.as_str());
    }

    // Capacity: the live count never exceeds the bound, only brand-new keys are
    // rejected, and updates of present keys always succeed.
    #[test]
    fn prop_capacity_enforcement(
        entries in prop::collection::vec((key_strategy(), value_strategy()), 1..200)
    ) {
        let max_entries = 20;
        let cache = new_cache(max_entries);
        let mut present = std::collections::HashSet::new();

        for (key, value) in entries {
            let result = cache.set(key.clone(), value);
            if present.contains(&key) {
                prop_assert!(result.is_ok(), "Updating an existing key must not fail");
            } else if present.len() == max_entries {
                prop_assert_eq!(result, Err(CacheError::SizeLimit { max_entries }));
            } else {
                prop_assert!(result.is_ok());
                present.insert(key);
            }
            prop_assert!(cache.len() <= max_entries);
            prop_assert_eq!(cache.len(), present.len());
        }
    }

    // Model check: any sequence of set/add/get matches a plain HashMap model
    // (no entry expires within the test's lifetime).
    #[test]
    fn prop_matches_model(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let max_entries = 30;
        let cache = new_cache(max_entries);
        let mut model: HashMap<String, String> = HashMap::new();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    let expected = if model.contains_key(&key) || model.len() < max_entries {
                        model.insert(key.clone(), value.clone());
                        Ok(())
                    } else {
                        Err(CacheError::SizeLimit { max_entries })
                    };
                    prop_assert_eq!(cache.set(key, value), expected);
                }
                CacheOp::Add { key, value } => {
                    let expected = if model.contains_key(&key) {
                        Err(CacheError::KeyExists)
                    } else if model.len() >= max_entries {
                        Err(CacheError::SizeLimit { max_entries })
                    } else {
                        model.insert(key.clone(), value.clone());
                        Ok(())
                    };
                    prop_assert_eq!(cache.add(key, value), expected);
                }
                CacheOp::Get { key } => {
                    match model.get(&key) {
                        Some(value) => {
                            expected_hits += 1;
                            let stored = cache.get(&key).unwrap();
                            prop_assert_eq!(stored.as_str(), value.as_str());
                        }
                        None => {
                            expected_misses += 1;
                            prop_assert_eq!(cache.get(&key), Err(CacheError::KeyNotFound));
                        }
                    }
                }
            }
        }

        let stats = cache.stats();
        prop_assert_eq!(stats.hits, expected_hits, "Hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "Misses mismatch");
        prop_assert_eq!(stats.total_entries, model.len(), "Total entries mismatch");
    }
}
