//! Backplane - in-process concurrency primitives for services
//!
//! Provides a TTL cache with capacity eviction, a keyed concurrency limiter
//! and a job runner with distributed-lock-guarded periodic jobs.

pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod limiter;
pub mod telemetry;

mod tasks;

pub use cache::{CacheConfig, CacheStats, KvCache};
pub use config::Config;
pub use error::{Error, Result};
pub use jobs::{DistributedLock, Job, MemoryLock, OneOffJob, PeriodicJob, Runner, RunnerConfig};
pub use limiter::{Limiter, LimiterConfig, LockInfo};
pub use telemetry::LogConfig;
