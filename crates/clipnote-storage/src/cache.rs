//! LRU cache tier
//!
//! Entries live in an arena of doubly-linked nodes addressed by index, with a
//! hash map from key to slot. Slot 0 is the head sentinel (most recent side),
//! slot 1 the tail sentinel. Every operation is O(1); nothing walks the list
//! except eviction, which takes the node before the tail.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

const HEAD: usize = 0;
const TAIL: usize = 1;

/// Counters for one cache tier
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries evicted for capacity
    pub evictions: u64,
    /// Current number of entries
    pub len: usize,
    pub capacity: usize,
}

impl TierStats {
    /// Calculate hit ratio (0.0 to 1.0)
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Per-entry access bookkeeping
#[derive(Clone, Copy, Debug)]
pub struct AccessInfo {
    pub hits: u64,
    pub last_access: Instant,
}

struct Node<K, V> {
    entry: Option<(K, V)>,
    prev: usize,
    next: usize,
    hits: u64,
    last_access: Instant,
}

impl<K, V> Node<K, V> {
    fn sentinel() -> Self {
        Self {
            entry: None,
            prev: HEAD,
            next: TAIL,
            hits: 0,
            last_access: Instant::now(),
        }
    }
}

/// Fixed-capacity least-recently-used cache
pub struct LruCache<K, V> {
    map: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    free: Vec<usize>,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries. Zero disables it.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut nodes = Vec::with_capacity(capacity.min(1024) + 2);
        nodes.push(Node::sentinel());
        nodes.push(Node::sentinel());
        nodes[HEAD].next = TAIL;
        nodes[TAIL].prev = HEAD;
        Self {
            map: HashMap::with_capacity(capacity.min(1024)),
            nodes,
            free: Vec::new(),
            capacity,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up a key, marking it most recently used on a hit
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(&slot) = self.map.get(key) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;
        self.unlink(slot);
        self.push_front(slot);
        let node = &mut self.nodes[slot];
        node.hits += 1;
        node.last_access = Instant::now();
        node.entry.as_ref().map(|(_, v)| v)
    }

    /// Look up a key without touching recency or statistics
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = *self.map.get(key)?;
        self.nodes[slot].entry.as_ref().map(|(_, v)| v)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Insert or replace a value as most recently used.
    ///
    /// Returns the entry evicted to make room, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.capacity == 0 {
            return None;
        }

        if let Some(&slot) = self.map.get(&key) {
            let node = &mut self.nodes[slot];
            node.entry = Some((key, value));
            node.last_access = Instant::now();
            self.unlink(slot);
            self.push_front(slot);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict_lru()
        } else {
            None
        };

        let node = Node {
            entry: Some((key.clone(), value)),
            prev: HEAD,
            next: TAIL,
            hits: 0,
            last_access: Instant::now(),
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.push_front(slot);
        self.map.insert(key, slot);
        evicted
    }

    /// Remove a key, returning its value
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = self.map.remove(key)?;
        self.release(slot).map(|(_, v)| v)
    }

    /// Drop every entry; statistics are kept
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.truncate(2);
        self.nodes[HEAD].next = TAIL;
        self.nodes[TAIL].prev = HEAD;
        self.free.clear();
    }

    #[must_use]
    pub fn stats(&self) -> TierStats {
        TierStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            len: self.map.len(),
            capacity: self.capacity,
        }
    }

    /// Hit count and last access time of a cached key
    pub fn access_info<Q>(&self, key: &Q) -> Option<AccessInfo>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let node = &self.nodes[*self.map.get(key)?];
        Some(AccessInfo {
            hits: node.hits,
            last_access: node.last_access,
        })
    }

    fn evict_lru(&mut self) -> Option<(K, V)> {
        let slot = self.nodes[TAIL].prev;
        if slot == HEAD {
            return None;
        }
        let (key, value) = self.release(slot)?;
        self.map.remove(&key);
        self.evictions += 1;
        Some((key, value))
    }

    /// Unlink a slot and return it to the free list
    fn release(&mut self, slot: usize) -> Option<(K, V)> {
        self.unlink(slot);
        self.free.push(slot);
        self.nodes[slot].entry.take()
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;
    }

    fn push_front(&mut self, slot: usize) {
        let first = self.nodes[HEAD].next;
        self.nodes[slot].prev = HEAD;
        self.nodes[slot].next = first;
        self.nodes[first].prev = slot;
        self.nodes[HEAD].next = slot;
    }

    /// Keys from most to least recently used
    #[cfg(test)]
    fn keys_mru(&self) -> Vec<K> {
        let mut keys = Vec::new();
        let mut slot = self.nodes[HEAD].next;
        while slot != TAIL {
            if let Some((k, _)) = &self.nodes[slot].entry {
                keys.push(k.clone());
            }
            slot = self.nodes[slot].next;
        }
        keys
    }
}
