use super::store::TaskRunStore;
use super::types::{TaskContext, TaskHandler, TaskOutcome, TaskRun, TaskStatus};
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

/// Drives registered [`TaskHandler`]s on their cadences.
///
/// Each firing produces one [`TaskRun`] row: created as `running` at start,
/// finalized with duration, status and details at the end. Transient
/// failures retry inside the firing per the task's policy; a run that
/// exceeds its deadline is cancelled and recorded as `error`.
pub struct Scheduler {
    store: Arc<dyn TaskRunStore>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    tasks: Vec<Arc<dyn TaskHandler>>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn TaskRunStore>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            store,
            clock,
            config,
            tasks: Vec::new(),
        }
    }

    pub fn register(&mut self, task: Arc<dyn TaskHandler>) {
        info!(task = task.name(), cadence = ?task.cadence(), "registered scheduled task");
        self.tasks.push(task);
    }

    /// Start all task loops. Reaps abandoned `running` rows first so a
    /// crashed predecessor does not leave dangling records.
    pub async fn start(self) -> Result<SchedulerHandle> {
        let cutoff =
            self.clock.now() - chrono::Duration::seconds(self.config.stale_run_reap_seconds as i64);
        match self.store.reap_stale(cutoff).await {
            Ok(0) => {}
            Ok(reaped) => warn!(reaped, "finalized abandoned task runs from a previous process"),
            Err(e) => error!(error = %e, "failed to reap stale task runs"),
        }

        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks));
        let mut joins = Vec::with_capacity(self.tasks.len());

        for task in &self.tasks {
            let task = Arc::clone(task);
            let store = Arc::clone(&self.store);
            let clock = Arc::clone(&self.clock);
            let config = self.config.clone();
            let semaphore = Arc::clone(&semaphore);
            let mut shutdown_rx = shutdown_tx.subscribe();

            joins.push(tokio::spawn(async move {
                let mut ticker = interval(task.cadence());
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // The first tick completes immediately; skip it so tasks
                // fire one cadence after startup.
                ticker.tick().await;

                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!(task = task.name(), "task loop stopping");
                            break;
                        }
                        _ = ticker.tick() => {
                            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => break,
                            };
                            run_scheduled_task(&*task, &*store, &*clock, &config).await;
                            drop(permit);
                        }
                    }
                }
            }));
        }

        info!(tasks = self.tasks.len(), "scheduler started");
        Ok(SchedulerHandle { shutdown_tx, joins })
    }
}

/// Handle for graceful shutdown: signals every task loop, then waits for
/// in-flight runs to finish.
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    joins: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for join in self.joins {
            let _ = join.await;
        }
        info!("scheduler stopped");
    }
}

/// Execute one firing of a task: record the run, retry transient failures,
/// enforce the deadline, finalize the record.
pub async fn run_scheduled_task(
    task: &dyn TaskHandler,
    store: &dyn TaskRunStore,
    clock: &dyn Clock,
    config: &SchedulerConfig,
) -> TaskRun {
    let mut run = TaskRun::start(task.name(), clock.now());
    if let Err(e) = store.insert(&run).await {
        error!(task = task.name(), error = %e, "failed to record task start");
    }

    let policy = task.retry_policy();
    let deadline = task
        .deadline()
        .unwrap_or(Duration::from_secs(config.default_deadline_seconds));

    let mut attempt: u32 = 0;
    let (status, details, error_message) = loop {
        attempt += 1;
        let ctx = TaskContext {
            run_id: run.run_id.clone(),
            attempt,
        };

        let outcome = match timeout(deadline, task.run(&ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(task = task.name(), ?deadline, "task run exceeded deadline, cancelled");
                break (
                    TaskStatus::Error,
                    None,
                    Some(format!("deadline of {deadline:?} exceeded")),
                );
            }
        };

        match outcome {
            TaskOutcome::Success(details) => {
                break (TaskStatus::Success, Some(details), None);
            }
            TaskOutcome::Retry(message) => {
                if attempt <= policy.max_retries {
                    let delay = policy.delay(attempt - 1);
                    warn!(
                        task = task.name(),
                        attempt,
                        error = %message,
                        "transient task failure, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    break (TaskStatus::Error, None, Some(message));
                }
            }
            TaskOutcome::Failed(message) => {
                error!(task = task.name(), error = %message, "task failed");
                break (TaskStatus::Error, None, Some(message));
            }
        }
    };

    let finished_at = clock.now();
    let mut details = details.unwrap_or_else(|| serde_json::json!({}));
    if attempt > 1 {
        if let Some(map) = details.as_object_mut() {
            map.insert("attempts".to_string(), serde_json::json!(attempt));
        }
    }
    run.mark_finished(status, finished_at, Some(details), error_message);

    if run.duration_ms > (config.long_run_warning_seconds * 1000) as i64 {
        warn!(
            task = task.name(),
            duration_ms = run.duration_ms,
            "task run exceeded the long-run warning threshold"
        );
    }

    if let Err(e) = store.update(&run).await {
        error!(task = task.name(), error = %e, "failed to finalize task run record");
    }

    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::tasks::store::MemoryTaskRunStore;
    use crate::tasks::types::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTask {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl TaskHandler for FlakyTask {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn cadence(&self) -> Duration {
            Duration::from_secs(3600)
        }

        fn retry_policy(&self) -> RetryPolicy {
            RetryPolicy {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(4),
                jitter: false,
                ..RetryPolicy::default()
            }
        }

        async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                TaskOutcome::Retry("upstream unreachable".to_string())
            } else {
                TaskOutcome::Success(serde_json::json!({"rows": 3}))
            }
        }
    }

    struct DoomedTask;

    #[async_trait]
    impl TaskHandler for DoomedTask {
        fn name(&self) -> &'static str {
            "doomed"
        }

        fn cadence(&self) -> Duration {
            Duration::from_secs(3600)
        }

        async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
            TaskOutcome::Failed("schema mismatch".to_string())
        }
    }

    struct SlowTask;

    #[async_trait]
    impl TaskHandler for SlowTask {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn cadence(&self) -> Duration {
            Duration::from_secs(3600)
        }

        fn deadline(&self) -> Option<Duration> {
            Some(Duration::from_millis(20))
        }

        async fn run(&self, _ctx: &TaskContext) -> TaskOutcome {
            tokio::time::sleep(Duration::from_secs(5)).await;
            TaskOutcome::success()
        }
    }

    fn test_config() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let store = MemoryTaskRunStore::new();
        let task = FlakyTask {
            calls: AtomicU32::new(0),
            fail_first: 2,
        };

        let run = run_scheduled_task(&task, &store, &SystemClock, &test_config()).await;

        assert_eq!(run.status, TaskStatus::Success);
        assert_eq!(run.details["rows"], 3);
        assert_eq!(run.details["attempts"], 3);
        assert_eq!(store.all().len(), 1);
        assert!(store.all()[0].is_terminal());
    }

    #[tokio::test]
    async fn non_transient_failure_is_recorded_without_retry() {
        let store = MemoryTaskRunStore::new();
        let run = run_scheduled_task(&DoomedTask, &store, &SystemClock, &test_config()).await;

        assert_eq!(run.status, TaskStatus::Error);
        assert_eq!(run.error.as_deref(), Some("schema mismatch"));
    }

    #[tokio::test]
    async fn deadline_cancels_the_run() {
        let store = MemoryTaskRunStore::new();
        let run = run_scheduled_task(&SlowTask, &store, &SystemClock, &test_config()).await;

        assert_eq!(run.status, TaskStatus::Error);
        assert!(run.error.unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = MemoryTaskRunStore::new();
        let task = FlakyTask {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        };

        let run = run_scheduled_task(&task, &store, &SystemClock, &test_config()).await;

        assert_eq!(run.status, TaskStatus::Error);
        // 1 initial attempt + max_retries retries.
        assert_eq!(task.calls.load(Ordering::SeqCst), 6);
    }
}
