//! Distributed Lock Module
//!
//! Set-if-absent locks with expiry used to run a periodic job on one
//! instance per period.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cache::{CacheConfig, KvCache};
use crate::error::Result;

/// Lock backend seam of the job runner.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Sets `key` with expiry `ttl` only if it is absent.
    ///
    /// Returns `Ok(true)` if this call took the lock, `Ok(false)` if it is
    /// held elsewhere, and [`Error::LockUnavailable`](crate::Error::LockUnavailable)
    /// if the backend could not be reached.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool>;
}

// == Memory Lock ==
/// Process-local lock backed by a KV cache. Only coordinates runners that
/// share the same instance.
pub struct MemoryLock {
    held: Arc<KvCache<()>>,
    set: Mutex<()>,
}

impl MemoryLock {
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let held = KvCache::start(CacheConfig {
            cleanup_interval: Some(Duration::from_secs(60)),
            ..CacheConfig::default()
        });

        Self {
            held,
            set: Mutex::new(()),
        }
    }

    /// Whether `key` is currently held.
    pub fn is_held(&self, key: &str) -> bool {
        self.held.contains(key)
    }
}

impl Default for MemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let _guard = self.set.lock();

        if self.held.contains(key) {
            return Ok(false);
        }
        self.held.set_ttl(key, (), Some(ttl));
        Ok(true)
    }
}

// == Redis Lock ==
#[cfg(feature = "redis")]
pub use self::redis_lock::RedisLock;

#[cfg(feature = "redis")]
mod redis_lock {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::DistributedLock;
    use crate::error::{Error, Result};

    fn unavailable(err: redis::RedisError) -> Error {
        Error::LockUnavailable(err.to_string())
    }

    /// Lock shared across instances through `SET key 1 NX PX ttl`.
    #[derive(Clone)]
    pub struct RedisLock {
        client: redis::Client,
    }

    impl RedisLock {
        pub fn new(client: redis::Client) -> Self {
            Self { client }
        }

        pub fn open(url: &str) -> Result<Self> {
            redis::Client::open(url).map(Self::new).map_err(unavailable)
        }
    }

    #[async_trait]
    impl DistributedLock for RedisLock {
        async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<bool> {
            let mut conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(unavailable)?;

            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(1)
                .arg("NX")
                .arg("PX")
                .arg(ttl_ms)
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;

            Ok(reply.is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_denied_until_expiry() {
        let lock = MemoryLock::new();
        let ttl = Duration::from_secs(10);

        assert!(lock.try_acquire("0:jobs:lock:report", ttl).await.unwrap());
        assert!(!lock.try_acquire("0:jobs:lock:report", ttl).await.unwrap());
        assert!(lock.is_held("0:jobs:lock:report"));

        tokio::time::advance(ttl).await;

        assert!(!lock.is_held("0:jobs:lock:report"));
        assert!(lock.try_acquire("0:jobs:lock:report", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let lock = MemoryLock::new();
        let ttl = Duration::from_secs(10);

        assert!(lock.try_acquire("a", ttl).await.unwrap());
        assert!(lock.try_acquire("b", ttl).await.unwrap());
        assert!(!lock.try_acquire("a", ttl).await.unwrap());
    }
}
