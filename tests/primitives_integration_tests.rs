//! Integration Tests for the Public API
//!
//! Exercises the cache, limiter and runner together the way a service
//! wires them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backplane::{
    CacheConfig, Error, KvCache, Limiter, LimiterConfig, MemoryLock, OneOffJob, PeriodicJob,
    Runner, RunnerConfig,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

// == Helper Functions ==

fn cache_config(ttl_secs: u64, capacity: usize) -> CacheConfig {
    CacheConfig {
        ttl: Duration::from_secs(ttl_secs),
        cleanup_interval: Some(Duration::from_secs(1)),
        capacity,
        auto_refresh: false,
    }
}

// == Cache Tests ==

#[tokio::test(start_paused = true)]
async fn test_cache_janitor_delivers_evictions() {
    let cache = KvCache::start(cache_config(2, 0));
    let evicted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&evicted);
    cache.set_eviction_callback(move |key, value: &u32| {
        sink.lock().push((key.to_string(), *value));
    });

    cache.set("a", 1);
    cache.set_ttl("b", 2, Some(Duration::from_secs(10)));

    sleep(Duration::from_millis(3500)).await;

    assert_eq!(evicted.lock().as_slice(), &[("a".to_string(), 1)]);
    assert!(!cache.contains("a"));
    assert_eq!(cache.get("b"), Some(2));
}

#[tokio::test]
async fn test_cache_capacity_and_stats_snapshot() {
    let cache: KvCache<&'static str> = KvCache::kv(CacheConfig {
        cleanup_interval: None,
        ..cache_config(60, 2)
    });

    cache.set_ttl("short", "s", Some(Duration::from_secs(5)));
    cache.set_ttl("long", "l", Some(Duration::from_secs(50)));
    cache.set_ttl("mid", "m", Some(Duration::from_secs(20)));

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("short"), None);
    assert_eq!(cache.get("mid"), Some("m"));

    let stats = cache.stats();
    assert_eq!(
        serde_json::to_value(stats).unwrap(),
        json!({ "hits": 1, "misses": 1, "evictions": 1, "total_entries": 2 })
    );
}

// == Limiter Tests ==

#[tokio::test(start_paused = true)]
async fn test_limiter_bounds_concurrent_jobs() {
    let limiter = Arc::new(Limiter::new(LimiterConfig::default()));
    let runner = Runner::new(Arc::new(MemoryLock::new()), RunnerConfig::default());
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    for i in 0..6 {
        let limiter = Arc::clone(&limiter);
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        let completed = Arc::clone(&completed);

        runner.run(OneOffJob::new(format!("upload-{i}"), move |cancel| {
            let limiter = Arc::clone(&limiter);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let completed = Arc::clone(&completed);
            async move {
                limiter.acquire("uploads", 2, &cancel).await?;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);

                sleep(Duration::from_secs(1)).await;

                active.fetch_sub(1, Ordering::SeqCst);
                limiter.release("uploads", 2);
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));
    }

    runner.graceful_stop().await;

    assert_eq!(completed.load(Ordering::SeqCst), 6);
    assert_eq!(peak.load(Ordering::SeqCst), 2);

    let info = limiter.info("uploads", 2).unwrap();
    assert_eq!((info.held, info.queued), (0, 0));
    assert_eq!(info.to_string(), "{Cap:2, Taken:0}");
}

#[tokio::test(start_paused = true)]
async fn test_limiter_timeout_and_invalid_capacity() {
    let limiter = Limiter::new(LimiterConfig {
        queue: 1,
        ..LimiterConfig::default()
    });
    let cancel = CancellationToken::new();

    limiter.acquire("db", 1, &cancel).await.unwrap();

    let err = limiter
        .acquire_timeout("db", 1, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded));

    let err = limiter.acquire("db", 0, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::InvalidCapacity));

    limiter.release("db", 1);
    assert_eq!(limiter.info("db", 1).unwrap().held, 0);

    limiter.shutdown();
}

// == Runner Tests ==

#[tokio::test(start_paused = true)]
async fn test_periodic_job_runs_on_one_runner_per_period() {
    let lock = Arc::new(MemoryLock::new());
    let runners: Vec<Runner> = (0..3)
        .map(|_| Runner::new(lock.clone(), RunnerConfig::default()))
        .collect();
    let runs = Arc::new(AtomicUsize::new(0));

    for runner in &runners {
        let runs = Arc::clone(&runs);
        runner.run(
            PeriodicJob::new("compact", Duration::from_secs(60), move |_| {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                }
            })
            .with_resolution(Duration::from_secs(5)),
        );
    }

    sleep(Duration::from_secs(150)).await;

    // t = 0, 60, 120
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert!(lock.is_held("0:jobs:lock:compact"));

    for runner in &runners {
        runner.graceful_stop().await;
    }
}

#[tokio::test]
async fn test_run_once_reports_failure() {
    let runner = Runner::new(Arc::new(MemoryLock::new()), RunnerConfig::default());
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    runner.set_error_handler(move |job, err| sink.lock().push(format!("{job}: {err}")));

    let ok = OneOffJob::new("warmup", |_| async { Ok(()) });
    let failing = OneOffJob::new("import", |_| async { anyhow::bail!("bad header") });

    assert!(runner.run_once(&ok).await.is_ok());
    assert!(runner.run_once(&failing).await.is_err());
    assert_eq!(
        failures.lock().as_slice(),
        &["import: Job import failed: bad header".to_string()]
    );

    runner.graceful_stop().await;
}
