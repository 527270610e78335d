//! Cache Module
//!
//! Provides in-memory caching with TTL expiration, capacity eviction by
//! earliest expiration, and eviction callbacks.

mod base;
mod entry;
mod kv;
mod order;
mod stats;


// Re-export public types
pub use base::{Cache, CacheConfig, DeleteHandler, EvictionCallback};
pub use entry::CacheEntry;
pub use kv::{KvCache, KvStore, PinFn};
pub use order::ExpiryOrder;
pub use stats::CacheStats;
