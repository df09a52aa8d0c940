use crate::upstream::UpstreamError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type for the infrastructure layer.
///
/// Domain crates wrap this in their own error enums; the variants here map
/// onto the transport-level taxonomy (transient I/O, decode, resource
/// exhaustion, precondition, fatal).
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache backend error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("task `{task}` failed: {message}")]
    Task { task: String, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn task(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Task {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Whether a retry of the failed operation could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            Error::Database(sqlx::Error::Io(_)) => true,
            Error::Cache(_) => true,
            Error::Upstream(e) => e.is_retryable(),
            Error::Task { .. } => false,
            _ => false,
        }
    }

    /// HTTP status for the external boundary. The routing layer itself is
    /// an external collaborator; this mapping keeps the contract stable.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::NotFound(_) => 404,
            Error::Upstream(e) => e.http_status(),
            Error::Database(_) | Error::Cache(_) => 503,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::UpstreamErrorKind;

    #[test]
    fn upstream_timeouts_are_retryable() {
        let err = Error::Upstream(UpstreamError::new(
            "sales",
            UpstreamErrorKind::Timeout,
            "deadline exceeded",
        ));
        assert!(err.is_retryable());
        assert_eq!(err.http_status(), 503);
    }

    #[test]
    fn invalid_input_maps_to_400() {
        let err = Error::InvalidInput("periods must be in 1..=365".into());
        assert!(!err.is_retryable());
        assert_eq!(err.http_status(), 400);
    }
}
