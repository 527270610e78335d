//! Backplane demo service
//!
//! Wires the cache, limiter and job runner together and runs until
//! Ctrl+C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use backplane::{telemetry, Config, KvCache, Limiter, MemoryLock, PeriodicJob, Runner, RunnerConfig};

const REPORT_KEY: &str = "uploads";
const REPORT_CAPACITY: usize = 4;
const REPORT_PERIOD: Duration = Duration::from_secs(30);

/// Startup sequence:
/// 1. Load configuration from environment variables
/// 2. Initialize tracing
/// 3. Build the cache, limiter and runner
/// 4. Schedule the limiter report and a worker loop
/// 5. Stop gracefully on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    telemetry::init(&config.log).context("failed to initialize tracing")?;

    info!(?config, "Starting backplane demo");

    let cache: Arc<KvCache<String>> = KvCache::start(config.cache.clone());
    cache.set_eviction_callback(|key, _| info!(key = %key, "Cache entry evicted"));

    let limiter = Arc::new(Limiter::new(config.limiter.clone()));
    let runner = Runner::new(
        Arc::new(MemoryLock::new()),
        RunnerConfig::default().with_service_key(config.jobs_service_key.clone()),
    );

    let report = {
        let limiter = Arc::clone(&limiter);
        let cache = Arc::clone(&cache);
        PeriodicJob::new("limiter-report", REPORT_PERIOD, move |_| {
            let limiter = Arc::clone(&limiter);
            let cache = Arc::clone(&cache);
            async move {
                let info = limiter
                    .info(REPORT_KEY, REPORT_CAPACITY)
                    .map(|info| info.to_string())
                    .unwrap_or_else(|| "idle".to_string());
                info!(key = REPORT_KEY, slots = %info, stats = ?cache.stats(), "Limiter report");
                cache.set("last-report", info);
                Ok(true)
            }
        })
        .with_resolution(Duration::from_secs(5))
    };
    runner.run(report);

    runner.spawn(worker(Arc::clone(&limiter), runner.stop_token()));

    shutdown_signal().await;

    runner.graceful_stop().await;
    limiter.shutdown();
    cache.stop_janitor();

    info!("Shutdown complete");
    Ok(())
}

/// Takes and releases limiter slots until stop is requested.
async fn worker(limiter: Arc<Limiter>, stop: CancellationToken) {
    loop {
        match limiter.acquire(REPORT_KEY, REPORT_CAPACITY, &stop).await {
            Ok(_) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = stop.cancelled() => {}
                }
                limiter.release(REPORT_KEY, REPORT_CAPACITY);
            }
            Err(err) => {
                info!(error = %err, "Worker stopping");
                break;
            }
        }
        if stop.is_cancelled() {
            break;
        }
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
