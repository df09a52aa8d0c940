use crate::model::RecommendationStatus;
use restock_core::UpstreamError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalyticsError>;

/// Analytics domain errors.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no data: {0}")]
    NoData(String),

    #[error("invalid recommendation transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: RecommendationStatus,
        to: RecommendationStatus,
    },

    #[error("forecast failed: {0}")]
    Forecast(String),

    #[error("event decode failed: {0}")]
    EventDecode(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache backend error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] restock_core::Error),
}

impl AnalyticsError {
    /// HTTP status for the external boundary: input problems are 400-class,
    /// hard-down upstreams are 503.
    pub fn http_status(&self) -> u16 {
        match self {
            AnalyticsError::InvalidInput(_) | AnalyticsError::InvalidTransition { .. } => 400,
            AnalyticsError::NoData(_) => 404,
            AnalyticsError::Upstream(e) => e.http_status(),
            AnalyticsError::Database(_) | AnalyticsError::Cache(_) => 503,
            AnalyticsError::Core(e) => e.http_status(),
            _ => 500,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            AnalyticsError::Upstream(e) => e.is_retryable(),
            AnalyticsError::Database(sqlx::Error::PoolTimedOut) => true,
            AnalyticsError::Database(sqlx::Error::Io(_)) => true,
            AnalyticsError::Cache(_) => true,
            AnalyticsError::Core(e) => e.is_retryable(),
            _ => false,
        }
    }
}
