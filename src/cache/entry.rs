//! Cache Entry Module
//!
//! A stored value with its expiration deadline and sliding TTL.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with value and expiration metadata.
///
/// Invariant: `expires_at` is always the creation or last refresh time plus `ttl`.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Point in time after which the entry is no longer served
    pub expires_at: Instant,
    /// Lifetime granted on creation and on every refresh
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` after `now`.
    pub fn new(value: V, ttl: Duration, now: Instant) -> Self {
        Self {
            value,
            expires_at: now + ttl,
            ttl,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired once `now` reaches its
    /// expiration time, matching the sweep which removes `expires_at <= now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    // == Refresh ==
    /// Extends the expiration by the entry's own TTL and returns the new deadline.
    pub fn refresh(&mut self, now: Instant) -> Instant {
        self.expires_at = now + self.ttl;
        self.expires_at
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, `Duration::ZERO` once expired.
    pub fn ttl_remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}
