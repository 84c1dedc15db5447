//! Fixed-capacity associative store with reproducible eviction.
//!
//! Eviction always picks the live slot with the smallest
//! `(last_used, insertion_order)` pair, so two runs that issue the same
//! `get`/`put` sequence evict the same entries. Invalidation is per owner
//! domain and drops everything that owner holds.

use std::collections::HashMap;
use std::hash::Hash;

/// Key of a cached payload. Every key belongs to exactly one owner domain.
pub trait CacheKey: Clone + Eq + Hash {
    fn owner(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub overwrites: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

#[derive(Debug, Clone)]
struct CacheSlot<K, V> {
    key: K,
    payload: V,
    last_used: u64,
    insertion_order: u64,
}

#[derive(Debug, Clone)]
pub struct DeterministicCache<K, V> {
    slots: Vec<Option<CacheSlot<K, V>>>,
    index: HashMap<K, usize>,
    use_clock: u64,
    insertion_clock: u64,
    stats: CacheStats,
}

impl<K: CacheKey, V> DeterministicCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            index: HashMap::with_capacity(capacity),
            use_clock: 0,
            insertion_clock: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Looks up `key` and marks it as most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let Some(&slot_idx) = self.index.get(key) else {
            self.stats.misses += 1;
            return None;
        };
        self.stats.hits += 1;
        let stamp = self.tick_use();
        let slot = self.slots[slot_idx].as_mut()?;
        slot.last_used = stamp;
        Some(&slot.payload)
    }

    /// Looks up `key` without touching recency or stats.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let slot_idx = *self.index.get(key)?;
        self.slots[slot_idx].as_ref().map(|slot| &slot.payload)
    }

    /// Stores `payload` under `key`, overwriting in place when the key is
    /// already present. Returns `None` only for a zero-capacity cache.
    pub fn put(&mut self, key: K, payload: V) -> Option<&V> {
        if self.slots.is_empty() {
            return None;
        }
        let stamp = self.tick_use();

        if let Some(&slot_idx) = self.index.get(&key) {
            self.stats.overwrites += 1;
            let slot = self.slots[slot_idx].as_mut()?;
            slot.payload = payload;
            slot.last_used = stamp;
            return Some(&slot.payload);
        }

        let slot_idx = match self.slots.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                let victim = self.eviction_candidate()?;
                if let Some(evicted) = self.slots[victim].take() {
                    self.index.remove(&evicted.key);
                    self.stats.evictions += 1;
                }
                victim
            }
        };

        let insertion_order = self.insertion_clock;
        self.insertion_clock += 1;
        self.stats.inserts += 1;
        self.index.insert(key.clone(), slot_idx);
        let slot = self.slots[slot_idx].insert(CacheSlot {
            key,
            payload,
            last_used: stamp,
            insertion_order,
        });
        Some(&slot.payload)
    }

    /// Drops every entry owned by `owner`. Returns how many were dropped.
    pub fn invalidate_owner(&mut self, owner: u64) -> usize {
        let mut dropped = 0;
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|s| s.key.owner() == owner) {
                if let Some(removed) = slot.take() {
                    self.index.remove(&removed.key);
                    dropped += 1;
                }
            }
        }
        self.stats.invalidations += dropped as u64;
        dropped
    }

    pub fn clear(&mut self) {
        let dropped = self.index.len();
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.index.clear();
        self.stats.invalidations += dropped as u64;
    }

    /// Keys in slot order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.slots.iter().flatten().map(|slot| &slot.key)
    }

    fn tick_use(&mut self) -> u64 {
        let stamp = self.use_clock;
        self.use_clock += 1;
        stamp
    }

    fn eviction_candidate(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                slot.as_ref()
                    .map(|s| ((s.last_used, s.insertion_order), idx))
            })
            .min_by_key(|(order, _)| *order)
            .map(|(_, idx)| idx)
    }
}
