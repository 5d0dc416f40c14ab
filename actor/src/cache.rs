// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Bounded least-recently-used map.
//!
//! Recency is tracked with a monotonically increasing stamp per access; the oldest stamp is
//! evicted when the capacity is exceeded.
//!

use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    hash::Hash,
};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    stamp: u64,
}

/// LRU cache with a fixed capacity.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
    order: BTreeMap<u64, K>,
    clock: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates an empty cache holding at most `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Returns the entry and marks it as most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let stamp = self.tick();
        let entry = self.entries.get_mut(key)?;
        if let Some(owned) = self.order.remove(&entry.stamp) {
            self.order.insert(stamp, owned);
        }
        entry.stamp = stamp;
        Some(&entry.value)
    }

    /// Mutable variant of [`LruCache::get`].
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let stamp = self.tick();
        let entry = self.entries.get_mut(key)?;
        if let Some(owned) = self.order.remove(&entry.stamp) {
            self.order.insert(stamp, owned);
        }
        entry.stamp = stamp;
        Some(&mut entry.value)
    }

    /// Returns the entry without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Inserts or replaces an entry, evicting the least recently used one on overflow.
    ///
    /// Returns the evicted entry, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        let stamp = self.tick();
        if let Some(old) = self.entries.insert(key.clone(), Entry { value, stamp }) {
            self.order.remove(&old.stamp);
        }
        self.order.insert(stamp, key);

        if self.entries.len() > self.capacity {
            let (_, oldest) = self.order.pop_first()?;
            let entry = self.entries.remove(&oldest)?;
            return Some((oldest, entry.value));
        }
        None
    }

    /// Removes an entry.
    pub fn pop<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.stamp);
        Some(entry.value)
    }

    /// Keeps only the entries matching the predicate. Returns how many were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let before = self.entries.len();
        let order = &mut self.order;
        self.entries.retain(|key, entry| {
            let keep = keep(key, &entry.value);
            if !keep {
                order.remove(&entry.stamp);
            }
            keep
        });
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
