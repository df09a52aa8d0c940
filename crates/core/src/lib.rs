pub mod cache;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod tasks;
pub mod upstream;

pub use cache::{CacheBackend, CacheStats, DistributedCache, MemoryCacheBackend, RedisCacheBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AnalyticsConfig, Config, DatabaseConfig, RedisConfig, SchedulerConfig, ServicesConfig};
pub use database::DatabasePool;
pub use error::{Error, Result};
pub use tasks::{
    MemoryTaskRunStore, PostgresTaskRunStore, RetryPolicy, Scheduler, SchedulerHandle, TaskContext,
    TaskHandler, TaskOutcome, TaskRun, TaskRunStore, TaskStatus,
};
pub use upstream::{ProbeReport, ServiceClient, ServiceHealth, UpstreamError, UpstreamErrorKind};

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, NaiveDate, Utc};
pub use uuid::Uuid;
