//! Postgres connection pool management.
//!
//! A thin wrapper around `sqlx::PgPool` configured from [`DatabaseConfig`].
//! Repositories borrow the pool; all writes use upsert semantics so retried
//! batches stay idempotent.

use crate::{config::DatabaseConfig, error::Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "database pool established"
        );

        Ok(Self { pool })
    }

    /// Wrap an externally constructed pool (test harnesses).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn get(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
