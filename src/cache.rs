//! Memoization of expensive per-element computations.
//!
//! A [`BatchCache`] stores one value per key, where a key is typically
//! `(one element of an array argument, the remaining arguments)`. Batch
//! lookups compute only the keys that are missing, in a single call to the
//! wrapped function, and then assemble the answer in request order.
//!
//! Caches are plain values owned by whoever uses them (a model, a market-data
//! wrapper, a calibration session). There is no process-global state.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use tracing::trace;

use crate::error::SurfaceError;

/// Hashable, bit-exact wrapper for `f64` cache keys.
///
/// `-0.0` is folded onto `0.0` and every NaN onto a single canonical NaN so
/// that equal inputs always produce equal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FloatKey(u64);

impl FloatKey {
    pub fn new(value: f64) -> Self {
        let normalised = if value == 0.0 {
            0.0
        } else if value.is_nan() {
            f64::NAN
        } else {
            value
        };
        Self(normalised.to_bits())
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<f64> for FloatKey {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

/// Converts a parameter vector into hashable keys.
pub fn float_keys(values: &[f64]) -> Vec<FloatKey> {
    values.iter().copied().map(FloatKey::new).collect()
}

/// Retention policy of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Entries live as long as the cache itself (one session).
    #[default]
    Session,
    /// Keep at most this many entries, evicting the oldest insertions first.
    Bounded(usize),
}

/// Hit/miss counters of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, V>,
    insertion_order: VecDeque<K>,
}

impl<K, V> Default for CacheState<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
        }
    }
}

/// Thread-safe memo table with batch lookups.
#[derive(Debug)]
pub struct BatchCache<K, V> {
    state: RwLock<CacheState<K, V>>,
    policy: CachePolicy,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> Default for BatchCache<K, V> {
    fn default() -> Self {
        Self::with_policy(CachePolicy::Session)
    }
}

impl<K, V> BatchCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: CachePolicy) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            policy,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry and resets the counters.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.entries.clear();
        state.insertion_order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl<K, V> BatchCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn get(&self, key: &K) -> Option<V> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.entries.get(key).cloned()
    }

    /// Inserts `value` unless the key is already present; returns the stored value.
    pub fn insert(&self, key: K, value: V) -> V {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        self.insert_locked(&mut state, key, value)
    }

    fn insert_locked(&self, state: &mut CacheState<K, V>, key: K, value: V) -> V {
        if let Some(existing) = state.entries.get(&key) {
            return existing.clone();
        }
        state.entries.insert(key.clone(), value.clone());
        state.insertion_order.push_back(key);

        if let CachePolicy::Bounded(max_entries) = self.policy {
            while state.entries.len() > max_entries.max(1) {
                match state.insertion_order.pop_front() {
                    Some(oldest) => {
                        state.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        value
    }

    /// Returns the cached value for `key`, computing it on a miss.
    ///
    /// `compute` runs without holding the lock, so it may itself use rayon or
    /// other caches. Concurrent misses on one key may compute it more than
    /// once; the first value stored wins and is returned to every caller.
    pub fn get_or_try_insert_with<F>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute()?;
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        Ok(self.insert_locked(&mut state, key, value))
    }

    /// Batch lookup: computes the missing keys with one call to `compute`.
    ///
    /// `compute` receives the distinct missing keys in first-seen order and
    /// must return exactly one value per key. The result follows `keys`.
    pub fn get_or_try_compute_batch<F>(&self, keys: &[K], compute: F) -> Result<Vec<V>>
    where
        F: FnOnce(&[K]) -> Result<Vec<V>>,
    {
        let mut resolved: HashMap<K, V> = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();
        let mut pending: HashSet<&K> = HashSet::new();
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            for key in keys {
                if resolved.contains_key(key) || pending.contains(key) {
                    continue;
                }
                match state.entries.get(key) {
                    Some(value) => {
                        resolved.insert(key.clone(), value.clone());
                    }
                    None => {
                        pending.insert(key);
                        missing.push(key.clone());
                    }
                }
            }
        }

        let misses = missing.len();
        let hits = keys.len() - misses;
        self.hits.fetch_add(hits as u64, Ordering::Relaxed);
        self.misses.fetch_add(misses as u64, Ordering::Relaxed);
        trace!(hits, misses, "batch cache lookup");

        if !missing.is_empty() {
            let values = compute(&missing)?;
            if values.len() != missing.len() {
                return Err(SurfaceError::numerical(format!(
                    "batch computation returned {} values for {} keys",
                    values.len(),
                    missing.len()
                ))
                .into());
            }
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            for (key, value) in missing.into_iter().zip(values) {
                let stored = self.insert_locked(&mut state, key.clone(), value);
                resolved.insert(key, stored);
            }
        }

        keys.iter()
            .map(|key| {
                resolved
                    .get(key)
                    .cloned()
                    .ok_or_else(|| anyhow::Error::from(SurfaceError::numerical("cache key left unresolved")))
            })
            .collect()
    }
}
