//! Cache Janitor Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{Cache, DeleteHandler};

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// The task holds only a weak reference to the cache: it exits when `stop`
/// is cancelled or once the cache has been dropped. A stopped janitor is
/// never restarted.
pub(crate) fn spawn_janitor<H: DeleteHandler>(
    cache: Weak<Cache<H>>,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "Starting cache janitor");

        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(cache) = cache.upgrade() else {
                break;
            };

            let removed = cache.delete_expired(Instant::now());
            if removed > 0 {
                info!("Janitor: removed {} expired entries", removed);
            } else {
                debug!("Janitor: no expired entries found");
            }
        }

        debug!("Cache janitor stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::{CacheConfig, KvCache};

    fn config(ttl_ms: u64, cleanup_ms: u64) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_millis(ttl_ms),
            cleanup_interval: Some(Duration::from_millis(cleanup_ms)),
            ..CacheConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_removes_expired_entries() {
        let cache: Arc<KvCache<String>> = KvCache::start(config(1000, 1000));
        cache.set("expire_soon", "value".to_string());

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(cache.len(), 0, "Expired entry should have been swept");
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_preserves_valid_entries() {
        let cache: Arc<KvCache<String>> = KvCache::start(config(1000, 1000));
        cache.set_ttl("long_lived", "value".to_string(), Some(Duration::from_secs(3600)));

        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(cache.get("long_lived"), Some("value".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_janitor_no_longer_sweeps() {
        let cache: Arc<KvCache<u32>> = KvCache::start(config(1000, 1000));
        cache.set("key", 1);
        cache.stop_janitor();

        tokio::time::sleep(Duration::from_secs(5)).await;

        // Expired but never swept: hidden from reads, still stored.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("key"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_eviction_order() {
        let cache: Arc<KvCache<u32>> = KvCache::start(config(10_000, 1000));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        cache.set_eviction_callback(move |key, _| sink.lock().push(key.to_string()));

        cache.set_ttl("third", 3, Some(Duration::from_millis(1300)));
        cache.set_ttl("first", 1, Some(Duration::from_millis(1100)));
        cache.set_ttl("second", 2, Some(Duration::from_millis(1200)));

        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }
}
