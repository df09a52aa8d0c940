use super::types::{TaskRun, TaskStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Mutex;

/// Persistence for [`TaskRun`] records.
#[async_trait]
pub trait TaskRunStore: Send + Sync {
    async fn insert(&self, run: &TaskRun) -> Result<()>;
    async fn update(&self, run: &TaskRun) -> Result<()>;
    /// Finalize `running` rows started before `cutoff` as `error`.
    /// Returns the number of rows reaped.
    async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn recent(&self, limit: i64) -> Result<Vec<TaskRun>>;
}

pub struct PostgresTaskRunStore {
    pool: PgPool,
}

impl PostgresTaskRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRunStore for PostgresTaskRunStore {
    async fn insert(&self, run: &TaskRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO task_runs (id, run_id, task_name, status, started_at, finished_at, duration_ms, details, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.id)
        .bind(&run.run_id)
        .bind(&run.task_name)
        .bind(run.status)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.duration_ms)
        .bind(&run.details)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, run: &TaskRun) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE task_runs
            SET status = $2, finished_at = $3, duration_ms = $4, details = $5, error = $6
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.status)
        .bind(run.finished_at)
        .bind(run.duration_ms)
        .bind(&run.details)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE task_runs
            SET status = 'error', finished_at = now(), error = 'reaped: run abandoned'
            WHERE status = 'running' AND started_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<TaskRun>> {
        let runs = sqlx::query_as::<_, TaskRun>(
            r#"
            SELECT id, run_id, task_name, status, started_at, finished_at, duration_ms, details, error
            FROM task_runs
            ORDER BY started_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }
}

/// In-memory store for tests and local development.
#[derive(Default)]
pub struct MemoryTaskRunStore {
    runs: Mutex<Vec<TaskRun>>,
}

impl MemoryTaskRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<TaskRun> {
        self.runs.lock().expect("task run lock").clone()
    }
}

#[async_trait]
impl TaskRunStore for MemoryTaskRunStore {
    async fn insert(&self, run: &TaskRun) -> Result<()> {
        self.runs.lock().expect("task run lock").push(run.clone());
        Ok(())
    }

    async fn update(&self, run: &TaskRun) -> Result<()> {
        let mut runs = self.runs.lock().expect("task run lock");
        if let Some(existing) = runs.iter_mut().find(|r| r.id == run.id) {
            *existing = run.clone();
        }
        Ok(())
    }

    async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut runs = self.runs.lock().expect("task run lock");
        let mut reaped = 0;
        for run in runs.iter_mut() {
            if run.status == TaskStatus::Running && run.started_at < cutoff {
                run.mark_finished(
                    TaskStatus::Error,
                    Utc::now(),
                    None,
                    Some("reaped: run abandoned".to_string()),
                );
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<TaskRun>> {
        let mut runs = self.runs.lock().expect("task run lock").clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }
}
