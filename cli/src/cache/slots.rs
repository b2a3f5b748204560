//! Generation-guarded cache slots.
//!
//! A read that misses records the slot's generation before fetching and
//! stores its result only if the generation is unchanged afterwards, so a
//! fetch that straddles an invalidation can never overwrite it.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Result;

#[derive(Debug)]
struct Slot<V> {
    generation: u64,
    value: Option<V>,
}

impl<V> Default for Slot<V> {
    fn default() -> Self {
        Self {
            generation: 0,
            value: None,
        }
    }
}

enum Lookup<V> {
    Hit(V),
    Miss(u64),
}

/// Keyed cache entries with per-key generation counters.
#[derive(Debug)]
pub(crate) struct Slots<K, V> {
    inner: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for Slots<K, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Slots<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn lookup(&self, key: &K) -> Lookup<V> {
        let mut inner = self.inner.lock();
        let slot = inner.entry(key.clone()).or_default();
        match &slot.value {
            Some(value) => Lookup::Hit(value.clone()),
            None => Lookup::Miss(slot.generation),
        }
    }

    /// Stores `value` if the slot is still at `generation`.
    fn fill(&self, key: &K, generation: u64, value: V) -> bool {
        let mut inner = self.inner.lock();
        let slot = inner.entry(key.clone()).or_default();
        if slot.generation != generation {
            return false;
        }
        slot.value = Some(value);
        true
    }

    /// Returns the cached value, or fetches it and caches it if still current.
    ///
    /// The fetched value is returned to the caller either way.
    pub(crate) async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        match self.lookup(&key) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Miss(generation) => {
                let value = fetch().await?;
                if !self.fill(&key, generation, value.clone()) {
                    trace!("Discarding cache fill started before an invalidation");
                }
                Ok(value)
            },
        }
    }

    /// Marks `key` stale.
    pub(crate) fn invalidate(&self, key: &K) {
        let mut inner = self.inner.lock();
        let slot = inner.entry(key.clone()).or_default();
        slot.generation += 1;
        slot.value = None;
    }

    /// Marks every key matching `predicate` stale.
    pub(crate) fn invalidate_where(&self, predicate: impl Fn(&K) -> bool) {
        for (key, slot) in self.inner.lock().iter_mut() {
            if predicate(key) {
                slot.generation += 1;
                slot.value = None;
            }
        }
    }

    pub(crate) fn is_fresh(&self, key: &K) -> bool {
        self.inner
            .lock()
            .get(key)
            .is_some_and(|slot| slot.value.is_some())
    }

    #[cfg(test)]
    pub(crate) fn generation(&self, key: &K) -> u64 {
        self.inner
            .lock()
            .get(key)
            .map_or(0, |slot| slot.generation)
    }
}
