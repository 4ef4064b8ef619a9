//! In-memory TTL cache with insertion-order eviction
//!
//! Entries expire a fixed TTL after they were (last) inserted. Expired entries
//! are treated as absent by [`TtlCache::get`] but stay in the map until they
//! are evicted, so they still occupy capacity. When the cache is full the
//! oldest *inserted* key is evicted, regardless of how often it was read.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Keys in first-insertion order
    order: VecDeque<K>,
}

#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: RwLock<Inner<K, V>>,
    max_entries: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner
            .entries
            .get(key)
            .filter(|entry| entry.is_valid_at(now))
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        let entry = CacheEntry {
            value,
            inserted_at: now,
            expires_at: now + self.ttl,
        };

        let mut inner = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = inner.entries.get_mut(&key) {
            *existing = entry;
            return;
        }

        if inner.entries.len() >= self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                debug!(key = ?oldest, max_entries = self.max_entries, "Evicted oldest cache entry");
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, entry);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        debug!(removed, "Cleared memory cache");
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
