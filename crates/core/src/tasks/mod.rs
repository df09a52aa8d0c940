//! Scheduler and task runner.
//!
//! Periodic jobs register a [`TaskHandler`] with a cadence; the
//! [`Scheduler`] drives them, records a [`TaskRun`] row per firing and
//! retries transient failures with exponential backoff and jitter.

pub mod scheduler;
pub mod store;
pub mod types;

pub use scheduler::{Scheduler, SchedulerHandle};
pub use store::{MemoryTaskRunStore, PostgresTaskRunStore, TaskRunStore};
pub use types::{RetryPolicy, TaskContext, TaskHandler, TaskOutcome, TaskRun, TaskStatus};
