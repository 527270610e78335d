//! Job Runner Module
//!
//! Runs one-off jobs and lock-guarded periodic jobs on background tasks and
//! waits for all of them on graceful stop.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::jobs::job::{Job, OneOffJob, PeriodicJob, WorkFn};
use crate::jobs::lock::DistributedLock;

/// Maps a periodic job to the partition prefix of its lock key.
pub type Partition = Arc<dyn Fn(&PeriodicJob) -> String + Send + Sync>;

/// Receives the job name and the error of every failed run.
pub type ErrorHandler = Arc<dyn Fn(&str, &Error) + Send + Sync>;

// == Runner Config ==
#[derive(Clone)]
pub struct RunnerConfig {
    /// Namespace of the lock keys, default `jobs`
    pub service_key: String,
    /// Lock key partition, default `0` for every job
    pub partition: Partition,
}

impl RunnerConfig {
    pub fn with_service_key(mut self, service_key: impl Into<String>) -> Self {
        self.service_key = service_key.into();
        self
    }

    pub fn with_partition<F>(mut self, partition: F) -> Self
    where
        F: Fn(&PeriodicJob) -> String + Send + Sync + 'static,
    {
        self.partition = Arc::new(partition);
        self
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            service_key: "jobs".to_string(),
            partition: Arc::new(|_: &PeriodicJob| "0".to_string()),
        }
    }
}

impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("service_key", &self.service_key)
            .finish_non_exhaustive()
    }
}

// == Shared State ==
struct Shared {
    lock: Arc<dyn DistributedLock>,
    config: RunnerConfig,
    stop: CancellationToken,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl Shared {
    fn lock_key(&self, job: &PeriodicJob) -> String {
        format!(
            "{}:{}:lock:{}",
            (self.config.partition)(job),
            self.config.service_key,
            job.lock_key()
        )
    }

    fn report(&self, job: &str, err: &Error) {
        let handler = self.error_handler.read().clone();
        match handler {
            Some(handler) => handler(job, err),
            None => error!(job = %job, error = %err, "Job failed"),
        }
    }

    /// Runs one invocation of a job body and reports its failure.
    async fn process(&self, job: &str, work: &WorkFn, timeout: Option<Duration>) -> Result<bool> {
        info!(job = %job, "Running job");

        let cancel = CancellationToken::new();
        let run = work(cancel.clone());

        let outcome = match timeout.filter(|timeout| !timeout.is_zero()) {
            Some(timeout) => match tokio::time::timeout(timeout, run).await {
                Ok(result) => result.map_err(|err| Error::job_failed(job, err)),
                Err(_) => {
                    cancel.cancel();
                    Err(Error::JobTimedOut {
                        job: job.to_string(),
                        timeout,
                    })
                }
            },
            None => run.await.map_err(|err| Error::job_failed(job, err)),
        };

        if let Err(err) = &outcome {
            self.report(job, err);
        }
        outcome
    }

    /// Lock-guarded loop of a periodic job. The first attempt always runs,
    /// stop is only observed between attempts. A body that is not done runs
    /// again at the resolution cadence while this runner still holds the
    /// lock for the current period.
    async fn run_periodic(self: Arc<Self>, job: PeriodicJob) {
        let lock_key = self.lock_key(&job);
        let resolution = job.resolution();
        info!(
            job = %job.name,
            lock = %lock_key,
            period = ?job.period,
            resolution = ?resolution,
            "Periodic job scheduled"
        );

        // End of the period this runner holds the lock for
        let mut held_until: Option<Instant> = None;

        loop {
            let acquired = if held_until.is_some_and(|until| Instant::now() < until) {
                Ok(true)
            } else {
                let acquired_at = Instant::now();
                let result = self.lock.try_acquire(&lock_key, job.period).await;
                if matches!(result, Ok(true)) {
                    held_until = Some(acquired_at + job.period);
                }
                result
            };

            let wait = match acquired {
                Ok(true) => match self.process(&job.name, &job.work, job.timeout).await {
                    Ok(true) => job.period,
                    Ok(false) | Err(_) => resolution,
                },
                Ok(false) => {
                    debug!(job = %job.name, lock = %lock_key, "Lock held elsewhere");
                    resolution
                }
                Err(err) => {
                    warn!(job = %job.name, error = %err, "Could not check job lock");
                    resolution
                }
            };

            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = sleep(wait) => {}
            }
        }

        debug!(job = %job.name, "Periodic job stopped");
    }
}

// == Runner ==
/// Runs jobs on tracked background tasks.
pub struct Runner {
    shared: Arc<Shared>,
    tracker: TaskTracker,
}

impl Runner {
    pub fn new(lock: Arc<dyn DistributedLock>, config: RunnerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                lock,
                config,
                stop: CancellationToken::new(),
                error_handler: RwLock::new(None),
            }),
            tracker: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.shared.config
    }

    /// Full lock key of a periodic job: `{partition}:{service_key}:lock:{lock_key}`.
    pub fn lock_key(&self, job: &PeriodicJob) -> String {
        self.shared.lock_key(job)
    }

    // == Run ==
    /// Starts a job in the background. Must be called from within a Tokio
    /// runtime.
    pub fn run(&self, job: impl Into<Job>) {
        let shared = Arc::clone(&self.shared);
        let job = job.into();
        debug!(job = %job.name(), kind = %job, "Job submitted");

        match job {
            Job::OneOff(job) => {
                self.tracker.spawn(async move {
                    // Failures are already reported
                    let _ = shared.process(&job.name, &job.work, job.timeout).await;
                });
            }
            Job::Periodic(job) => {
                if job.period.is_zero() {
                    error!(job = %job.name, "Periodic job has a zero period, not scheduled");
                    return;
                }
                self.tracker.spawn(shared.run_periodic(job));
            }
        }
    }

    /// Runs a one-off job on the current task and returns its outcome.
    /// Failures also reach the error handler.
    pub async fn run_once(&self, job: &OneOffJob) -> Result<()> {
        self.tracker
            .track_future(self.shared.process(&job.name, &job.work, job.timeout))
            .await
            .map(|_| ())
    }

    /// Spawns an arbitrary future that graceful stop waits for.
    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(fut);
    }

    /// Token cancelled once graceful stop begins, for spawned loops.
    pub fn stop_token(&self) -> CancellationToken {
        self.shared.stop.clone()
    }

    // == Error Handler ==
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &Error) + Send + Sync + 'static,
    {
        *self.shared.error_handler.write() = Some(Arc::new(handler));
    }

    /// Falls back to logging failures.
    pub fn clear_error_handler(&self) {
        *self.shared.error_handler.write() = None;
    }

    // == Graceful Stop ==
    /// Signals periodic jobs to stop and waits for every in-flight run and
    /// spawned task to finish.
    pub async fn graceful_stop(&self) {
        info!("Stopping job runner");
        self.shared.stop.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Job runner stopped");
    }
}
