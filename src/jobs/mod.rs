//! Jobs Module
//!
//! One-off and periodic background jobs. Periodic jobs take a distributed
//! lock before each run so only one instance runs them per period.

mod job;
mod lock;
mod runner;

pub use job::{default_resolution, Job, OneOffJob, PeriodicJob, WorkFn};
pub use lock::{DistributedLock, MemoryLock};
#[cfg(feature = "redis")]
pub use lock::RedisLock;
pub use runner::{ErrorHandler, Partition, Runner, RunnerConfig};
