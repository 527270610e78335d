//! Expiry Order Module
//!
//! Keeps cache keys sorted by expiration time for sweeps and capacity eviction.

use std::collections::{BTreeMap, HashMap};

use tokio::time::Instant;

/// Position of a key in the order: expiration first, insertion sequence second.
type Position = (Instant, u64);

// == Expiry Order ==
/// Tracks keys in ascending expiration order.
///
/// Entries with equal expiration keep insertion order, so a key inserted or
/// moved at time `t` lands after every key already expiring at or before `t`.
/// The position index and the ordered map always hold the same key set.
#[derive(Debug, Default)]
pub struct ExpiryOrder {
    /// Ordered sequence, front = earliest to expire
    order: BTreeMap<Position, String>,
    /// key -> position in `order`
    positions: HashMap<String, Position>,
    next_seq: u64,
}

impl ExpiryOrder {
    // == Constructor ==
    /// Creates a new empty order.
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Places `key` at its expiration position, moving it if already tracked.
    pub fn insert(&mut self, key: &str, expires_at: Instant) {
        self.remove(key);

        let position = (expires_at, self.next_seq);
        self.next_seq += 1;

        self.order.insert(position, key.to_string());
        self.positions.insert(key.to_string(), position);
    }

    // == Sort Move ==
    /// Repositions an already tracked key after its expiration changed.
    ///
    /// Returns false when the key is unknown.
    pub fn sort_move(&mut self, key: &str, expires_at: Instant) -> bool {
        if !self.positions.contains_key(key) {
            return false;
        }
        self.insert(key, expires_at);
        true
    }

    // == Remove ==
    /// Removes a key, returning the expiration it was tracked with.
    pub fn remove(&mut self, key: &str) -> Option<Instant> {
        let position = self.positions.remove(key)?;
        self.order.remove(&position);
        Some(position.0)
    }

    // == Earliest ==
    /// Returns the key closest to expiring without removing it.
    pub fn earliest(&self) -> Option<(&str, Instant)> {
        self.order
            .first_key_value()
            .map(|((expires_at, _), key)| (key.as_str(), *expires_at))
    }

    // == Pop Earliest ==
    /// Removes and returns the key closest to expiring.
    pub fn pop_earliest(&mut self) -> Option<(String, Instant)> {
        let ((expires_at, _), key) = self.order.pop_first()?;
        self.positions.remove(&key);
        Some((key, expires_at))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    // == Iter ==
    /// Iterates keys from earliest to latest expiration.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Instant)> {
        self.order
            .iter()
            .map(|((expires_at, _), key)| (key.as_str(), *expires_at))
    }
}
