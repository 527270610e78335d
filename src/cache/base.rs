//! Base Cache Module
//!
//! Generic TTL cache engine: keeps keys in expiration order, enforces
//! capacity, and delivers evicted entries to an optional callback. What
//! "deleting a value" means is delegated to a [`DeleteHandler`], so concrete
//! caches only decide how values are stored.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cache::order::ExpiryOrder;
use crate::cache::stats::{CacheStats, StatsCounters};
use crate::tasks::spawn_janitor;

// == Cache Config ==
/// Construction parameters for a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Default lifetime of an entry
    pub ttl: Duration,
    /// Janitor period; `None` (or zero) disables the background sweep
    pub cleanup_interval: Option<Duration>,
    /// Maximum number of entries, 0 = unbounded
    pub capacity: usize,
    /// Extend an entry's expiration on every successful read
    pub auto_refresh: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            cleanup_interval: Some(Duration::from_secs(15)),
            capacity: 0,
            auto_refresh: false,
        }
    }
}

// == Delete Handler ==
/// Storage strategy plugged into [`Cache`].
///
/// `delete` runs while the structural lock is held and must not call back
/// into the cache.
pub trait DeleteHandler: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    /// Removes the value stored under `key`. `None` if it was already gone.
    fn delete(&mut self, key: &str) -> Option<Self::Value>;

    /// Asked by expiry sweeps before deleting `key`. Returning a new
    /// deadline keeps the entry, rescheduled at that deadline.
    fn extend(&mut self, _key: &str, _now: Instant) -> Option<Instant> {
        None
    }
}

/// Callback invoked with every evicted key and value.
pub type EvictionCallback<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

/// Evicted pairs collected under the lock, delivered after it is released.
pub(crate) type Evicted<V> = Vec<(String, V)>;

enum JanitorState {
    Idle,
    Running(CancellationToken),
    Stopped,
}

// == Inner ==
/// Structural state guarded by the cache lock.
pub(crate) struct Inner<H> {
    pub(crate) order: ExpiryOrder,
    pub(crate) store: H,
}

impl<H: DeleteHandler> Inner<H> {
    /// Removes `key` from both the order and the store.
    pub(crate) fn delete_key(&mut self, key: &str) -> Option<(String, H::Value)> {
        self.order.remove(key);
        self.store.delete(key).map(|value| (key.to_string(), value))
    }

    /// Removes the entry closest to expiring.
    pub(crate) fn delete_oldest(&mut self) -> Option<(String, H::Value)> {
        let (key, _) = self.order.pop_earliest()?;
        self.store.delete(&key).map(|value| (key, value))
    }

    /// Removes entries in expiration order while `expires_at <= cutoff`.
    /// `None` removes everything, including entries the store would extend.
    pub(crate) fn delete_until(&mut self, cutoff: Option<Instant>) -> Evicted<H::Value> {
        let mut evicted = Vec::new();
        let mut extended = Vec::new();

        while let Some(expires_at) = self.order.earliest().map(|(_, at)| at) {
            if cutoff.is_some_and(|now| expires_at > now) {
                break;
            }
            let Some((key, _)) = self.order.pop_earliest() else {
                break;
            };

            if let Some(deadline) = cutoff.and_then(|now| self.store.extend(&key, now)) {
                extended.push((key, deadline));
                continue;
            }
            evicted.extend(self.store.delete(&key).map(|value| (key, value)));
        }

        // Reinserted after the loop so a deadline <= cutoff cannot spin
        for (key, deadline) in extended {
            self.order.insert(&key, deadline);
        }

        evicted
    }

    /// Evicts earliest-expiring entries until `len <= capacity`.
    pub(crate) fn enforce_capacity(&mut self, capacity: usize) -> Evicted<H::Value> {
        let mut evicted = Vec::new();

        if capacity > 0 {
            while self.order.len() > capacity {
                evicted.extend(self.delete_oldest());
            }
        }

        evicted
    }
}

// == Cache ==
/// TTL cache ordered by expiration, generic over its storage strategy.
pub struct Cache<H: DeleteHandler> {
    config: CacheConfig,
    inner: RwLock<Inner<H>>,
    on_evicted: RwLock<Option<EvictionCallback<H::Value>>>,
    janitor: Mutex<JanitorState>,
    stats: StatsCounters,
}

impl<H: DeleteHandler> Cache<H> {
    // == Constructor ==
    /// Creates a cache over `store`. The janitor is not running until
    /// [`Cache::start_janitor`] is called.
    pub fn new(store: H, config: CacheConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner {
                order: ExpiryOrder::new(),
                store,
            }),
            on_evicted: RwLock::new(None),
            janitor: Mutex::new(JanitorState::Idle),
            stats: StatsCounters::default(),
        }
    }

    /// Returns a copy of the config.
    pub fn config(&self) -> CacheConfig {
        self.config.clone()
    }

    // == Janitor ==
    /// Starts the background sweep. Must be called from within a Tokio runtime.
    ///
    /// # Panics
    /// If the janitor was already started (or started and stopped) on this
    /// cache: a janitor runs at most once per cache.
    pub fn start_janitor(self: &Arc<Self>) {
        let mut state = self.janitor.lock();

        if !matches!(*state, JanitorState::Idle) {
            panic!("janitor cannot be started twice on the same cache");
        }

        match self.config.cleanup_interval {
            Some(interval) if !interval.is_zero() => {
                let stop = CancellationToken::new();
                spawn_janitor(Arc::downgrade(self), interval, stop.clone());
                *state = JanitorState::Running(stop);
            }
            _ => *state = JanitorState::Stopped,
        }
    }

    /// Stops the background sweep permanently. Safe to call more than once.
    pub fn stop_janitor(&self) {
        let mut state = self.janitor.lock();

        if let JanitorState::Running(stop) = &*state {
            stop.cancel();
        }
        *state = JanitorState::Stopped;
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Eviction Callback ==
    /// Sets the function called with every evicted key and value.
    pub fn set_eviction_callback<F>(&self, f: F)
    where
        F: Fn(&str, &H::Value) + Send + Sync + 'static,
    {
        *self.on_evicted.write() = Some(Arc::new(f));
    }

    pub fn clear_eviction_callback(&self) {
        *self.on_evicted.write() = None;
    }

    // == Delete Oldest ==
    /// Removes the single entry closest to expiring. Returns true if a value
    /// was evicted.
    pub fn delete_oldest(&self) -> bool {
        let evicted = self.inner.write().delete_oldest();
        let removed = evicted.is_some();

        self.handle_eviction(evicted.into_iter().collect());
        removed
    }

    // == Delete Expired ==
    /// Removes every entry with `expires_at <= now`, in expiration order.
    ///
    /// Returns the number of evicted values.
    pub fn delete_expired(&self, now: Instant) -> usize {
        self.delete_until(Some(now))
    }

    // == Flush ==
    /// Removes every entry.
    pub fn flush(&self) -> usize {
        self.delete_until(None)
    }

    fn delete_until(&self, cutoff: Option<Instant>) -> usize {
        let evicted = self.inner.write().delete_until(cutoff);
        let count = evicted.len();

        self.handle_eviction(evicted);
        count
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    /// Returns keys with their expiration, earliest first.
    pub fn expiry_order(&self) -> Vec<(String, Instant)> {
        self.inner
            .read()
            .order
            .iter()
            .map(|(key, expires_at)| (key.to_string(), expires_at))
            .collect()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Inner<H>> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Inner<H>> {
        self.inner.write()
    }

    pub(crate) fn counters(&self) -> &StatsCounters {
        &self.stats
    }

    /// Delivers evicted pairs to the callback. Call without holding the
    /// structural lock.
    pub(crate) fn handle_eviction(&self, evicted: Evicted<H::Value>) {
        if evicted.is_empty() {
            return;
        }

        self.stats.record_evictions(evicted.len());

        let callback = self.on_evicted.read().clone();
        if let Some(callback) = callback {
            for (key, value) in &evicted {
                callback(key, value);
            }
        }
    }
}

impl<H: DeleteHandler> Drop for Cache<H> {
    fn drop(&mut self) {
        self.stop_janitor();
    }
}
