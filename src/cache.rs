//! Memoization keepers shared by the template cache and the result-type cache.
//!
//! A [`Keeper`] owns immutable values behind `Arc`s, so a cached entry keeps
//! its identity for as long as it stays cached. When a capacity is given the
//! least recently used entry is evicted first; `None` keeps everything.
//! [`SharedKeeper`] wraps a keeper in a mutex and never holds the lock while
//! a value is being computed. Two callers racing on the same key may both
//! compute it, the first one kept wins.

use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::error::Result;

pub type KeyHasher = BuildHasherDefault<SeaHasher>;

// ------------- Keeper -------------
#[derive(Debug)]
pub struct Keeper<K, V> {
    capacity: Option<usize>,
    kept: HashMap<K, (Arc<V>, u64), KeyHasher>,
    clock: u64,
}

impl<K: Eq + Hash + Clone, V> Keeper<K, V> {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            kept: HashMap::default(),
            clock: 0,
        }
    }
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
    pub fn get(&mut self, key: &K) -> Option<Arc<V>> {
        let now = self.tick();
        self.kept.get_mut(key).map(|(value, used)| {
            *used = now;
            Arc::clone(value)
        })
    }
    /// Keeps `value` under `key` unless something is already kept there.
    /// Returns the kept value and whether it was kept previously.
    pub fn keep(&mut self, key: K, value: V) -> (Arc<V>, bool) {
        if let Some(existing) = self.get(&key) {
            return (existing, true);
        }
        let keepsake = Arc::new(value);
        if self.capacity == Some(0) {
            return (keepsake, false);
        }
        let now = self.tick();
        self.kept.insert(key, (Arc::clone(&keepsake), now));
        self.evict();
        (keepsake, false)
    }
    fn evict(&mut self) {
        let Some(capacity) = self.capacity else { return };
        while self.kept.len() > capacity {
            let oldest = self
                .kept
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    self.kept.remove(&key);
                }
                None => break,
            }
        }
    }
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    pub fn clear(&mut self) {
        self.kept.clear();
    }
}

// ------------- SharedKeeper -------------
#[derive(Debug)]
pub struct SharedKeeper<K, V> {
    keeper: Mutex<Keeper<K, V>>,
}

impl<K: Eq + Hash + Clone, V> SharedKeeper<K, V> {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            keeper: Mutex::new(Keeper::new(capacity)),
        }
    }
    pub fn get(&self, key: &K) -> Result<Option<Arc<V>>> {
        Ok(self.keeper.lock()?.get(key))
    }
    /// Returns the value kept under `key`, computing and keeping it on a miss.
    /// The boolean tells whether the value came from the keeper.
    pub fn get_or_try_keep<F>(&self, key: &K, compute: F) -> Result<(Arc<V>, bool)>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(kept) = self.get(key)? {
            return Ok((kept, true));
        }
        let value = compute()?;
        Ok(self.keeper.lock()?.keep(key.clone(), value))
    }
    pub fn len(&self) -> Result<usize> {
        Ok(self.keeper.lock()?.len())
    }
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.keeper.lock()?.is_empty())
    }
    pub fn clear(&self) -> Result<()> {
        self.keeper.lock()?.clear();
        Ok(())
    }
}
