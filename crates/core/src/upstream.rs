//! # Upstream Service Client
//!
//! Reusable HTTP client for the named upstream services (`sales`,
//! `inventory`, ...). Transient failures — timeouts, refused connections,
//! 429 and 5xx responses — are retried with exponential backoff before the
//! error reaches the caller. Retries apply to idempotent requests only;
//! POSTs must be explicitly marked retryable.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Classified transport failure, part of the public error contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Timeout,
    ConnectionRefused,
    Http4xx(u16),
    Http5xx(u16),
    Decode,
}

#[derive(Error, Debug)]
#[error("upstream `{service}` failed: {message}")]
pub struct UpstreamError {
    pub service: String,
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(
        service: impl Into<String>,
        kind: UpstreamErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            UpstreamErrorKind::Timeout
                | UpstreamErrorKind::ConnectionRefused
                | UpstreamErrorKind::Http4xx(429)
                | UpstreamErrorKind::Http5xx(_)
        )
    }

    pub fn http_status(&self) -> u16 {
        match self.kind {
            UpstreamErrorKind::Http4xx(code) => code,
            _ => 503,
        }
    }
}

/// Per-request options. The default is a GET-style idempotent request with
/// the client-wide timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    /// Opt a POST into the retry schedule. GETs always retry.
    pub retry_post: bool,
}

/// Outcome of probing one upstream's liveness path.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub healthy: bool,
    pub response_time_ms: u64,
}

/// Aggregated probe results across all configured upstreams.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProbeReport {
    pub healthy: usize,
    pub unhealthy: usize,
    pub results: Vec<ServiceHealth>,
}

impl ProbeReport {
    pub fn degraded(&self) -> bool {
        self.unhealthy > 0
    }
}

/// HTTP client with named service routing, retries and health probing.
pub struct ServiceClient {
    http: reqwest::Client,
    bases: HashMap<String, String>,
    default_timeout: Duration,
    probe_timeout: Duration,
    max_attempts: u32,
    backoff_base: Duration,
}

impl ServiceClient {
    pub fn new(bases: HashMap<String, String>, default_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            bases,
            default_timeout,
            probe_timeout: Duration::from_secs(3),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn services(&self) -> impl Iterator<Item = &String> {
        self.bases.keys()
    }

    fn base_url(&self, service: &str) -> Result<&str, UpstreamError> {
        self.bases.get(service).map(String::as_str).ok_or_else(|| {
            UpstreamError::new(
                service,
                UpstreamErrorKind::ConnectionRefused,
                format!("no base URL configured for service `{service}`"),
            )
        })
    }

    fn classify(service: &str, error: reqwest::Error) -> UpstreamError {
        let kind = if error.is_timeout() {
            UpstreamErrorKind::Timeout
        } else if error.is_connect() {
            UpstreamErrorKind::ConnectionRefused
        } else if error.is_decode() {
            UpstreamErrorKind::Decode
        } else {
            UpstreamErrorKind::ConnectionRefused
        };
        UpstreamError::new(service, kind, error.to_string())
    }

    /// Exponential backoff with factor 1.0: constant one-second spacing
    /// between the bounded attempts.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor: f64 = 1.0;
        self.backoff_base.mul_f64(factor.powi(attempt as i32))
    }

    async fn execute(
        &self,
        service: &str,
        method: Method,
        path: &str,
        query: Option<&[(String, String)]>,
        body: Option<&serde_json::Value>,
        options: RequestOptions,
    ) -> Result<serde_json::Value, UpstreamError> {
        let base = self.base_url(service)?;
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let retryable_method = method == Method::GET || options.retry_post;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let mut request = self.http.request(method.clone(), &url).timeout(timeout);
            if let Some(query) = query {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let outcome = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.json::<serde_json::Value>().await {
                            Ok(value) => return Ok(value),
                            Err(e) => Err(UpstreamError::new(
                                service,
                                UpstreamErrorKind::Decode,
                                e.to_string(),
                            )),
                        }
                    } else if status.is_client_error() {
                        Err(UpstreamError::new(
                            service,
                            UpstreamErrorKind::Http4xx(status.as_u16()),
                            format!("{} {}", status.as_u16(), url),
                        ))
                    } else {
                        Err(UpstreamError::new(
                            service,
                            UpstreamErrorKind::Http5xx(status.as_u16()),
                            format!("{} {}", status.as_u16(), url),
                        ))
                    }
                }
                Err(e) => Err(Self::classify(service, e)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let can_retry =
                        retryable_method && error.is_retryable() && attempt < self.max_attempts;
                    if !can_retry {
                        return Err(error);
                    }
                    let delay = self.retry_delay(attempt - 1);
                    warn!(
                        service,
                        %url,
                        attempt,
                        error = %error,
                        "upstream request failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// GET a JSON document from a named service.
    pub async fn get(
        &self,
        service: &str,
        path: &str,
        query: Option<&[(String, String)]>,
    ) -> Result<serde_json::Value, UpstreamError> {
        self.execute(
            service,
            Method::GET,
            path,
            query,
            None,
            RequestOptions::default(),
        )
        .await
    }

    /// GET and decode into a typed DTO at the boundary.
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        service: &str,
        path: &str,
        query: Option<&[(String, String)]>,
    ) -> Result<T, UpstreamError> {
        let value = self.get(service, path, query).await?;
        serde_json::from_value(value)
            .map_err(|e| UpstreamError::new(service, UpstreamErrorKind::Decode, e.to_string()))
    }

    /// POST a JSON body. Not retried unless `options.retry_post` is set.
    pub async fn post<B: Serialize>(
        &self,
        service: &str,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<serde_json::Value, UpstreamError> {
        let body = serde_json::to_value(body)
            .map_err(|e| UpstreamError::new(service, UpstreamErrorKind::Decode, e.to_string()))?;
        self.execute(service, Method::POST, path, None, Some(&body), options)
            .await
    }

    /// Probe one service's liveness path, falling back to the legacy
    /// health path when the primary is missing.
    pub async fn probe(&self, service: &str) -> ServiceHealth {
        let started = Instant::now();
        let healthy = match self.base_url(service) {
            Ok(base) => {
                let primary = format!("{}/health/live/", base.trim_end_matches('/'));
                let fallback = format!("{}/health/", base.trim_end_matches('/'));
                match self.probe_url(&primary).await {
                    true => true,
                    false => self.probe_url(&fallback).await,
                }
            }
            Err(_) => false,
        };

        ServiceHealth {
            service: service.to_string(),
            healthy,
            response_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn probe_url(&self, url: &str) -> bool {
        match self
            .http
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(%url, error = %e, "liveness probe failed");
                false
            }
        }
    }

    /// Probe every configured service.
    pub async fn probe_all(&self) -> ProbeReport {
        let mut results = Vec::with_capacity(self.bases.len());
        for service in self.bases.keys() {
            results.push(self.probe(service).await);
        }
        let healthy = results.iter().filter(|r| r.healthy).count();
        ProbeReport {
            healthy,
            unhealthy: results.len() - healthy,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        let timeout = UpstreamError::new("sales", UpstreamErrorKind::Timeout, "t");
        let refused = UpstreamError::new("sales", UpstreamErrorKind::ConnectionRefused, "r");
        let throttled = UpstreamError::new("sales", UpstreamErrorKind::Http4xx(429), "429");
        let not_found = UpstreamError::new("sales", UpstreamErrorKind::Http4xx(404), "404");
        let server = UpstreamError::new("sales", UpstreamErrorKind::Http5xx(502), "502");
        let decode = UpstreamError::new("sales", UpstreamErrorKind::Decode, "d");

        assert!(timeout.is_retryable());
        assert!(refused.is_retryable());
        assert!(throttled.is_retryable());
        assert!(server.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!decode.is_retryable());
    }

    #[test]
    fn client_errors_keep_their_status() {
        let not_found = UpstreamError::new("inventory", UpstreamErrorKind::Http4xx(404), "404");
        assert_eq!(not_found.http_status(), 404);

        let down = UpstreamError::new("inventory", UpstreamErrorKind::ConnectionRefused, "down");
        assert_eq!(down.http_status(), 503);
    }

    #[test]
    fn backoff_spacing_is_constant_with_unit_factor() {
        let client = ServiceClient::new(HashMap::new(), Duration::from_secs(5));
        assert_eq!(client.retry_delay(0), Duration::from_secs(1));
        assert_eq!(client.retry_delay(1), Duration::from_secs(1));
        assert_eq!(client.retry_delay(2), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn unknown_service_is_an_immediate_error() {
        let client = ServiceClient::new(HashMap::new(), Duration::from_secs(5));
        let err = client.get("nope", "/api/orders", None).await.unwrap_err();
        assert_eq!(err.kind, UpstreamErrorKind::ConnectionRefused);
    }
}
