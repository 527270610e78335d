//! KV Cache Module
//!
//! Key-value cache built on the generic [`Cache`]: values live in a map of
//! [`CacheEntry`], ordering and eviction are inherited from the base.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::cache::base::{Cache, CacheConfig, DeleteHandler, Inner};
use crate::cache::entry::CacheEntry;

// == KV Store ==
/// Predicate marking values that must not expire while it holds.
pub type PinFn<V> = Arc<dyn Fn(&V) -> bool + Send + Sync>;

/// Storage strategy of the KV cache: a key -> entry map.
pub struct KvStore<V> {
    values: HashMap<String, CacheEntry<V>>,
    pin: Option<PinFn<V>>,
}

impl<V> KvStore<V> {
    /// Store whose values matching `pin` stay live past their TTL. Sweeps
    /// reschedule them one TTL later instead of evicting them.
    pub fn pinned<F>(pin: F) -> Self
    where
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        Self {
            values: HashMap::new(),
            pin: Some(Arc::new(pin)),
        }
    }
}

impl<V> Default for KvStore<V> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            pin: None,
        }
    }
}

fn is_pinned<V>(pin: &Option<PinFn<V>>, value: &V) -> bool {
    pin.as_ref().is_some_and(|pin| pin(value))
}

fn is_live<V>(pin: &Option<PinFn<V>>, entry: &CacheEntry<V>, now: Instant) -> bool {
    !entry.is_expired(now) || is_pinned(pin, &entry.value)
}

impl<V: Send + Sync + 'static> DeleteHandler for KvStore<V> {
    type Value = V;

    fn delete(&mut self, key: &str) -> Option<V> {
        self.values.remove(key).map(|entry| entry.value)
    }

    fn extend(&mut self, key: &str, now: Instant) -> Option<Instant> {
        let entry = self.values.get_mut(key)?;
        is_pinned(&self.pin, &entry.value).then(|| entry.refresh(now))
    }
}

/// Key-value cache with TTL, capacity and optional sliding expiration.
pub type KvCache<V> = Cache<KvStore<V>>;

impl<V: Send + Sync + 'static> Inner<KvStore<V>> {
    fn insert(&mut self, key: &str, entry: CacheEntry<V>) {
        self.order.insert(key, entry.expires_at);
        self.store.values.insert(key.to_string(), entry);
    }
}

impl<V: Clone + Send + Sync + 'static> Cache<KvStore<V>> {
    // == Constructor ==
    /// Creates a KV cache without starting its janitor.
    pub fn kv(config: CacheConfig) -> Self {
        Cache::new(KvStore::default(), config)
    }

    /// Creates a shared KV cache and starts its janitor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: CacheConfig) -> Arc<Self> {
        let cache = Arc::new(Self::kv(config));
        cache.start_janitor();
        cache
    }

    fn effective_ttl(&self, ttl: Option<Duration>) -> Duration {
        ttl.filter(|ttl| !ttl.is_zero())
            .unwrap_or_else(|| self.config().ttl)
    }

    // == Get ==
    /// Returns a copy of the value at `key` unless missing or expired.
    ///
    /// With `auto_refresh` configured, a hit also extends the expiration.
    pub fn get(&self, key: &str) -> Option<V> {
        let refresh = self.config().auto_refresh;
        let value = self.lookup(key, refresh);

        match value {
            Some(_) => self.counters().record_hit(),
            None => self.counters().record_miss(),
        }
        value
    }

    fn lookup(&self, key: &str, refresh: bool) -> Option<V> {
        let now = Instant::now();

        if !refresh {
            let inner = self.read();
            let store = &inner.store;
            return store
                .values
                .get(key)
                .filter(|entry| is_live(&store.pin, entry, now))
                .map(|entry| entry.value.clone());
        }

        let mut inner = self.write();
        let Inner { order, store } = &mut *inner;

        let entry = store.values.get_mut(key)?;
        if !is_live(&store.pin, entry, now) {
            return None;
        }

        let expires_at = entry.refresh(now);
        order.sort_move(key, expires_at);
        Some(entry.value.clone())
    }

    // == Refresh ==
    /// Extends the expiration of `key`. Returns true on success.
    pub fn refresh(&self, key: &str) -> bool {
        self.lookup(key, true).is_some()
    }

    // == Set ==
    /// Inserts or replaces `key` with the default TTL.
    pub fn set(&self, key: &str, value: V) {
        self.set_ttl(key, value, None);
    }

    /// Inserts or replaces `key`. `None` (or zero) uses the default TTL.
    ///
    /// A replaced value goes through the eviction callback before the new one
    /// is stored.
    pub fn set_ttl(&self, key: &str, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, self.effective_ttl(ttl), Instant::now());
        let capacity = self.config().capacity;

        let evicted = {
            let mut inner = self.write();

            let mut evicted: Vec<_> = inner.delete_key(key).into_iter().collect();
            inner.insert(key, entry);
            evicted.extend(inner.enforce_capacity(capacity));
            evicted
        };

        self.handle_eviction(evicted);
    }

    // == Add ==
    /// Inserts `key` with the default TTL if absent.
    pub fn add(&self, key: &str, value: V) -> bool {
        self.add_ttl(key, value, None)
    }

    /// Inserts `key` if absent and returns true.
    ///
    /// A live existing entry is touched instead (expiration extended by its
    /// own TTL and repositioned) and false is returned. An expired entry that
    /// was not swept yet counts as absent and is replaced.
    pub fn add_ttl(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let now = Instant::now();
        let entry = CacheEntry::new(value, self.effective_ttl(ttl), now);
        let capacity = self.config().capacity;

        let evicted = {
            let mut inner = self.write();
            let Inner { order, store } = &mut *inner;

            if let Some(current) = store.values.get_mut(key) {
                if is_live(&store.pin, current, now) {
                    let expires_at = current.refresh(now);
                    order.sort_move(key, expires_at);
                    return false;
                }
            }

            let mut evicted: Vec<_> = inner.delete_key(key).into_iter().collect();
            inner.insert(key, entry);
            evicted.extend(inner.enforce_capacity(capacity));
            evicted
        };

        self.handle_eviction(evicted);
        true
    }

    // == Delete ==
    /// Removes `key`. Returns true if a value was evicted.
    pub fn delete(&self, key: &str) -> bool {
        let evicted = {
            let mut inner = self.write();
            if !inner.store.values.contains_key(key) {
                return false;
            }
            inner.delete_key(key)
        };

        let removed = evicted.is_some();
        self.handle_eviction(evicted.into_iter().collect());
        removed
    }

    // == Contains ==
    /// Returns true if `key` exists and is not expired. Never changes ordering.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let inner = self.read();
        inner
            .store
            .values
            .get(key)
            .is_some_and(|entry| is_live(&inner.store.pin, entry, now))
    }

    /// Remaining lifetime of `key`, `None` if missing or expired.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.read();
        inner
            .store
            .values
            .get(key)
            .filter(|entry| is_live(&inner.store.pin, entry, now))
            .map(|entry| entry.ttl_remaining(now))
    }

    // == Reduce ==
    /// Folds over all live entries while holding the structural lock.
    ///
    /// `f` must not call back into this cache.
    pub fn reduce<A, F>(&self, init: A, mut f: F) -> A
    where
        F: FnMut(A, &str, &V) -> A,
    {
        let now = Instant::now();
        let inner = self.read();

        inner
            .store
            .values
            .iter()
            .filter(|(_, entry)| is_live(&inner.store.pin, entry, now))
            .fold(init, |acc, (key, entry)| f(acc, key, &entry.value))
    }
}
