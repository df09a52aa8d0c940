use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of a task run. `Success` and `Error` are terminal; a
/// `Running` record must eventually transition or be reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Success,
    Error,
}

/// One recorded execution of a scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskRun {
    pub id: Uuid,
    pub run_id: String,
    pub task_name: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: i64,
    pub details: serde_json::Value,
    pub error: Option<String>,
}

impl TaskRun {
    pub fn start(task_name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            run_id: id.to_string(),
            task_name: task_name.into(),
            status: TaskStatus::Running,
            started_at,
            finished_at: None,
            duration_ms: 0,
            details: serde_json::json!({}),
            error: None,
        }
    }

    pub fn mark_finished(
        &mut self,
        status: TaskStatus,
        finished_at: DateTime<Utc>,
        details: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        self.status = status;
        self.finished_at = Some(finished_at);
        self.duration_ms = (finished_at - self.started_at).num_milliseconds().max(0);
        if let Some(details) = details {
            match (self.details.as_object_mut(), details.as_object()) {
                (Some(existing), Some(new)) => {
                    for (key, value) in new {
                        existing.insert(key.clone(), value.clone());
                    }
                }
                _ => self.details = details,
            }
        }
        self.error = error;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Success | TaskStatus::Error)
    }
}

/// Result of one handler invocation.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Completed; the payload is stored in the run's `details`.
    Success(serde_json::Value),
    /// Transient failure, retried per the task's [`RetryPolicy`].
    Retry(String),
    /// Non-transient failure; the run is marked `error` immediately.
    Failed(String),
}

impl TaskOutcome {
    pub fn success() -> Self {
        TaskOutcome::Success(serde_json::json!({}))
    }
}

/// Per-attempt context handed to handlers.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: String,
    /// 1-based attempt counter across retries of one firing.
    pub attempt: u32,
}

/// Exponential backoff with jitter. Defaults: base 1 s, factor ×2, up to
/// 5 retries, capped at 10 minutes.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: f64,
    pub max_retries: u32,
    pub cap: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            max_retries: 5,
            cap: Duration::from_secs(600),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based). Jitter spreads the
    /// delay over [half, full] to avoid thundering herds.
    pub fn delay(&self, retry: u32) -> Duration {
        let exp = self.base.mul_f64(self.factor.powi(retry as i32));
        let capped = exp.min(self.cap);
        if self.jitter {
            let half = capped.as_secs_f64() / 2.0;
            let spread: f64 = rand::random::<f64>() * half;
            Duration::from_secs_f64(half + spread)
        } else {
            capped
        }
    }
}

/// A periodic job. Implementations live with the domain logic; the
/// scheduler only sees this trait.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Interval between firings.
    fn cadence(&self) -> Duration;

    /// Per-run deadline override. `None` uses the scheduler default.
    fn deadline(&self) -> Option<Duration> {
        None
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    async fn run(&self, ctx: &TaskContext) -> TaskOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_records_duration_and_merges_details() {
        let started = Utc::now();
        let mut run = TaskRun::start("calculate_daily_metrics", started);
        run.details = serde_json::json!({"period_days": 30});
        assert_eq!(run.status, TaskStatus::Running);
        assert!(!run.is_terminal());

        run.mark_finished(
            TaskStatus::Success,
            started + chrono::Duration::milliseconds(1_500),
            Some(serde_json::json!({"rows": 12})),
            None,
        );

        assert!(run.is_terminal());
        assert_eq!(run.duration_ms, 1_500);
        assert_eq!(run.details["period_days"], 30);
        assert_eq!(run.details["rows"], 12);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay(0), Duration::from_secs(1));
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(8));
        assert_eq!(policy.delay(20), Duration::from_secs(600));
    }

    #[test]
    fn jittered_delay_stays_within_band() {
        let policy = RetryPolicy::default();
        for retry in 0..6 {
            let base = RetryPolicy {
                jitter: false,
                ..policy
            }
            .delay(retry);
            let jittered = policy.delay(retry);
            assert!(jittered >= base / 2);
            assert!(jittered <= base);
        }
    }
}
