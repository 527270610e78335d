//! Job Definitions Module
//!
//! One-off and periodic work items accepted by the runner.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

/// Job body. The token is cancelled once the job's timeout elapses.
/// Resolves to whether the unit of work is done.
pub type WorkFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, anyhow::Result<bool>> + Send + Sync>;

const MIN_DEFAULT_RESOLUTION: Duration = Duration::from_secs(5 * 60);
const MAX_DEFAULT_RESOLUTION: Duration = Duration::from_secs(60 * 60);

/// Lock retry interval used when a periodic job sets none:
/// a quarter of the period, kept between 5 minutes and 1 hour.
pub fn default_resolution(period: Duration) -> Duration {
    (period / 4).clamp(MIN_DEFAULT_RESOLUTION, MAX_DEFAULT_RESOLUTION)
}

// == One-off Job ==
/// Work that runs once, to completion or failure.
#[derive(Clone)]
pub struct OneOffJob {
    pub name: String,
    /// Upper bound on a single run, `None` = unbounded
    pub timeout: Option<Duration>,
    pub(crate) work: WorkFn,
}

impl OneOffJob {
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let work: WorkFn = Arc::new(move |cancel: CancellationToken| {
            let run = f(cancel);
            async move { run.await.map(|()| true) }.boxed()
        });

        Self {
            name: name.into(),
            timeout: None,
            work,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for OneOffJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OneOffJob<Name={}>", self.name)
    }
}

impl fmt::Debug for OneOffJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneOffJob")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// == Periodic Job ==
/// Work that runs once per period across the cluster, guarded by a
/// distributed lock.
///
/// The body resolves to `true` when its unit of work is done; `false` makes
/// the runner try again at the resolution cadence instead of waiting a
/// full period.
#[derive(Clone)]
pub struct PeriodicJob {
    pub name: String,
    /// Upper bound on a single run, `None` = unbounded
    pub timeout: Option<Duration>,
    /// Time between runs; also the expiry of the distributed lock
    pub period: Duration,
    /// Time between lock attempts, see [`default_resolution`]
    pub resolution: Option<Duration>,
    /// Lock key, defaults to the job name
    pub lock_key: Option<String>,
    pub(crate) work: WorkFn,
}

impl PeriodicJob {
    pub fn new<F, Fut>(name: impl Into<String>, period: Duration, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        let work: WorkFn = Arc::new(move |cancel: CancellationToken| f(cancel).boxed());

        Self {
            name: name.into(),
            timeout: None,
            period,
            resolution: None,
            lock_key: None,
            work,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_resolution(mut self, resolution: Duration) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn with_lock_key(mut self, lock_key: impl Into<String>) -> Self {
        self.lock_key = Some(lock_key.into());
        self
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
            .unwrap_or_else(|| default_resolution(self.period))
    }

    pub fn lock_key(&self) -> &str {
        self.lock_key.as_deref().unwrap_or(&self.name)
    }
}

impl fmt::Display for PeriodicJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeriodicJob<Name={}>", self.name)
    }
}

impl fmt::Debug for PeriodicJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicJob")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("period", &self.period)
            .field("resolution", &self.resolution)
            .field("lock_key", &self.lock_key)
            .finish_non_exhaustive()
    }
}

// == Job ==
/// A unit of work accepted by the runner.
#[derive(Debug, Clone)]
pub enum Job {
    OneOff(OneOffJob),
    Periodic(PeriodicJob),
}

impl Job {
    pub fn name(&self) -> &str {
        match self {
            Job::OneOff(job) => &job.name,
            Job::Periodic(job) => &job.name,
        }
    }
}

impl From<OneOffJob> for Job {
    fn from(job: OneOffJob) -> Self {
        Job::OneOff(job)
    }
}

impl From<PeriodicJob> for Job {
    fn from(job: PeriodicJob) -> Self {
        Job::Periodic(job)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::OneOff(job) => job.fmt(f),
            Job::Periodic(job) => job.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_periodic(period: Duration) -> PeriodicJob {
        PeriodicJob::new("report", period, |_| async { Ok(true) })
    }

    #[test]
    fn test_default_resolution_bounds() {
        assert_eq!(
            default_resolution(Duration::from_secs(60)),
            Duration::from_secs(5 * 60)
        );
        assert_eq!(
            default_resolution(Duration::from_secs(2 * 60 * 60)),
            Duration::from_secs(30 * 60)
        );
        assert_eq!(
            default_resolution(Duration::from_secs(24 * 60 * 60)),
            Duration::from_secs(60 * 60)
        );
    }

    #[test]
    fn test_periodic_defaults() {
        let job = noop_periodic(Duration::from_secs(60 * 60));

        assert_eq!(job.lock_key(), "report");
        assert_eq!(job.resolution(), Duration::from_secs(15 * 60));
        assert_eq!(job.timeout, None);
    }

    #[test]
    fn test_periodic_overrides() {
        let job = noop_periodic(Duration::from_secs(60))
            .with_lock_key("nightly-report")
            .with_resolution(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(30));

        assert_eq!(job.lock_key(), "nightly-report");
        assert_eq!(job.resolution(), Duration::from_secs(1));
        assert_eq!(job.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_display() {
        let one_off = OneOffJob::new("migrate", |_| async { Ok(()) });
        assert_eq!(one_off.to_string(), "OneOffJob<Name=migrate>");
        let periodic = Job::from(noop_periodic(Duration::from_secs(1)));
        assert_eq!(periodic.to_string(), "PeriodicJob<Name=report>");
        assert_eq!(periodic.name(), "report");
    }

    #[tokio::test]
    async fn test_one_off_work_reports_done() {
        let job = OneOffJob::new("migrate", |_| async { Ok(()) });
        let done = (job.work)(CancellationToken::new()).await.unwrap();
        assert!(done);
    }
}
