//! Limiter Module
//!
//! Named semaphores: each `(key, capacity)` pair owns a bounded set of
//! concurrency slots plus an admission counter. Slot sets live in a
//! [`KvCache`] with sliding TTL, so idle ones are garbage-collected.

mod info;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{Cache, CacheConfig, KvCache, KvStore};
use crate::error::{Error, Result};

pub use info::LockInfo;

// == Limiter Config ==
/// Construction parameters for a [`Limiter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterConfig {
    /// Maximum in-flight acquire attempts per slot set
    pub queue: usize,
    /// Idle lifetime of a slot set
    pub ttl: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            queue: 100,
            ttl: Duration::from_secs(10 * 60),
        }
    }
}

/// Slot set of a single `(key, capacity)` pair.
#[derive(Debug)]
struct Slot {
    capacity: usize,
    permits: Semaphore,
    held: AtomicUsize,
    queued: AtomicUsize,
}

impl Slot {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            permits: Semaphore::new(capacity),
            held: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    fn info(&self) -> LockInfo {
        LockInfo {
            capacity: self.capacity,
            held: self.held.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
        }
    }

    /// Held or awaited slot sets are pinned in the slot cache.
    fn is_busy(&self) -> bool {
        self.held.load(Ordering::SeqCst) > 0 || self.queued.load(Ordering::SeqCst) > 0
    }

    /// Returns one held slot. False if nothing was held.
    fn release(&self) -> bool {
        let released = self
            .held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |held| held.checked_sub(1))
            .is_ok();

        if released {
            self.permits.add_permits(1);
        }
        released
    }
}

/// Counts one in-flight acquire attempt until dropped.
struct QueueGuard<'a> {
    counter: &'a AtomicUsize,
    depth: usize,
}

impl<'a> QueueGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        let depth = counter.fetch_add(1, Ordering::SeqCst) + 1;
        Self { counter, depth }
    }
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

fn slot_key(key: &str, capacity: usize) -> String {
    format!("{key}:{capacity}")
}

// == Limiter ==
/// Keyed, capacity-bounded concurrency limiter.
pub struct Limiter {
    slots: Arc<KvCache<Arc<Slot>>>,
    create: Mutex<()>,
    config: LimiterConfig,
}

impl Limiter {
    // == Constructor ==
    /// Creates a limiter and starts the janitor of its slot cache.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: LimiterConfig) -> Self {
        let slots = Arc::new(Cache::new(
            KvStore::pinned(|slot: &Arc<Slot>| slot.is_busy()),
            CacheConfig {
                ttl: config.ttl,
                auto_refresh: true,
                ..CacheConfig::default()
            },
        ));
        slots.start_janitor();
        slots.set_eviction_callback(|key, slot: &Arc<Slot>| {
            debug!(key = %key, held = slot.held.load(Ordering::SeqCst), "Limiter slot expired");
        });

        Self {
            slots,
            create: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    fn slot(&self, slot_key: &str, capacity: usize) -> Arc<Slot> {
        match self.slots.get(slot_key) {
            Some(slot) => slot,
            None => self.create_slot(slot_key, capacity),
        }
    }

    /// Double-checked creation so racing callers share one slot set.
    fn create_slot(&self, slot_key: &str, capacity: usize) -> Arc<Slot> {
        let _guard = self.create.lock();

        if let Some(slot) = self.slots.get(slot_key) {
            return slot;
        }

        let slot = Arc::new(Slot::new(capacity));
        self.slots.set(slot_key, Arc::clone(&slot));
        slot
    }

    // == Acquire ==
    /// Takes one slot of `key` bounded by `capacity`, waiting until a slot
    /// frees up or `cancel` fires.
    pub async fn acquire(
        &self,
        key: &str,
        capacity: usize,
        cancel: &CancellationToken,
    ) -> Result<LockInfo> {
        self.acquire_with(key, capacity, cancel, None).await
    }

    /// Like [`Limiter::acquire`], giving up after `timeout`.
    pub async fn acquire_timeout(
        &self,
        key: &str,
        capacity: usize,
        timeout: Duration,
    ) -> Result<LockInfo> {
        let never = CancellationToken::new();
        self.acquire_with(key, capacity, &never, Some(Instant::now() + timeout))
            .await
    }

    /// Takes one slot, stopping early on cancellation or deadline.
    ///
    /// Fails with `InvalidCapacity` for a zero capacity and with
    /// `QueueOverflow` when more than the configured number of attempts are
    /// in flight for this slot set. A cancelled or expired call never holds
    /// a slot.
    pub async fn acquire_with(
        &self,
        key: &str,
        capacity: usize,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<LockInfo> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity);
        }

        let slot_key = slot_key(key, capacity);
        let slot = self.slot(&slot_key, capacity);

        let queue = QueueGuard::enter(&slot.queued);
        if queue.depth > self.config.queue {
            debug!(key = %slot_key, depth = queue.depth, "Limiter queue overflow");
            return Err(Error::QueueOverflow { key: slot_key });
        }

        let expired = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            _ = expired => Err(Error::DeadlineExceeded),
            permit = slot.permits.acquire() => {
                permit.map_err(|_| Error::Cancelled)?.forget();
                let held = slot.held.fetch_add(1, Ordering::SeqCst) + 1;

                Ok(LockInfo {
                    capacity,
                    held,
                    queued: slot.queued.load(Ordering::SeqCst).saturating_sub(1),
                })
            }
        }
    }

    // == Release ==
    /// Returns one held slot of `(key, capacity)`.
    ///
    /// Unknown keys and slot sets with nothing held are ignored: a release
    /// may race with the TTL eviction of an idle slot set.
    pub fn release(&self, key: &str, capacity: usize) {
        let slot_key = slot_key(key, capacity);

        let Some(slot) = self.slots.get(&slot_key) else {
            debug!(key = %slot_key, "Release on unknown limiter key");
            return;
        };

        if !slot.release() {
            debug!(key = %slot_key, "Release without a held slot");
        }
    }

    // == Info ==
    /// Point-in-time snapshot of `(key, capacity)`, `None` if unknown.
    pub fn info(&self, key: &str, capacity: usize) -> Option<LockInfo> {
        self.slots
            .get(&slot_key(key, capacity))
            .map(|slot| slot.info())
    }

    // == Shutdown ==
    /// Stops the slot cache janitor. Outstanding holds are left as they are.
    pub fn shutdown(&self) {
        self.slots.stop_janitor();
    }
}
