//! Compiled-condition cache: a bounded LRU keyed by the structural
//! normalizer's output, with single-flight build coalescing.
//!
//! Readers never contend with builders for long: the entry table lock covers
//! map operations only, and on a miss the actual build runs outside both
//! locks. At most one builder runs per key; concurrent callers for the same
//! key park on the build slot and observe the same result (or the same
//! error). Eviction is LRU on access, tracked with a monotonic tick so
//! same-second accesses stay ordered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::condition::{Condition, QueryBackend};
use crate::config::CachePolicy;
use crate::errors::Error;

struct CacheEntry<B: QueryBackend> {
    condition: Arc<Condition<B>>,
    last_accessed: u64,
}

enum BuildState<B: QueryBackend> {
    Pending,
    Done(Arc<Condition<B>>),
    Failed(Error),
}

struct BuildSlot<B: QueryBackend> {
    state: Mutex<BuildState<B>>,
    ready: Condvar,
}

impl<B: QueryBackend> BuildSlot<B> {
    fn new() -> Self {
        BuildSlot {
            state: Mutex::new(BuildState::Pending),
            ready: Condvar::new(),
        }
    }
}

/// Monotonic cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded LRU from structural key to shared condition tree.
pub struct ConditionCache<B: QueryBackend> {
    entries: Mutex<HashMap<String, CacheEntry<B>>>,
    in_flight: Mutex<HashMap<String, Arc<BuildSlot<B>>>>,
    policy: CachePolicy,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<B: QueryBackend> ConditionCache<B> {
    pub fn new(policy: CachePolicy) -> Self {
        ConditionCache {
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            policy,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CachePolicy::default())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Plain lookup; touches the entry's LRU position.
    pub fn get(&self, key: &str) -> Option<Arc<Condition<B>>> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(key) {
            entry.last_accessed = self.tick();
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(Arc::clone(&entry.condition))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Lookup, or build with at most one concurrent builder per key.
    ///
    /// The winning caller runs `build` outside the cache locks; everyone
    /// else parks until the result lands. A failed build propagates its
    /// error to every waiter and caches nothing.
    pub fn get_or_build<F>(&self, key: &str, build: F) -> Result<Arc<Condition<B>>, Error>
    where
        F: FnOnce() -> Result<Condition<B>, Error>,
    {
        {
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(key) {
                entry.last_accessed = self.tick();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&entry.condition));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let (slot, is_builder) = {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(key) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let slot = Arc::new(BuildSlot::new());
                    in_flight.insert(key.to_string(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if is_builder {
            log::debug!("condition cache miss for `{key}`, building");
            let result = build();
            let outcome = match result {
                Ok(condition) => {
                    let condition = Arc::new(condition);
                    self.insert(key, Arc::clone(&condition));
                    let mut state = slot.state.lock().unwrap();
                    *state = BuildState::Done(Arc::clone(&condition));
                    Ok(condition)
                }
                Err(error) => {
                    let mut state = slot.state.lock().unwrap();
                    *state = BuildState::Failed(error.clone());
                    Err(error)
                }
            };
            slot.ready.notify_all();
            self.in_flight.lock().unwrap().remove(key);
            outcome
        } else {
            let mut state = slot.state.lock().unwrap();
            loop {
                match &*state {
                    BuildState::Done(condition) => return Ok(Arc::clone(condition)),
                    BuildState::Failed(error) => return Err(error.clone()),
                    BuildState::Pending => state = slot.ready.wait(state).unwrap(),
                }
            }
        }
    }

    fn insert(&self, key: &str, condition: Arc<Condition<B>>) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.policy.max_size {
            if let Some(evict) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&evict);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                log::trace!("condition cache evicted `{evict}`");
            }
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                condition,
                last_accessed: self.tick(),
            },
        );
    }

    /// Drop every cached condition. In-flight builds are unaffected; their
    /// results land in the emptied table.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.lock().unwrap().len(),
            max_size: self.policy.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
