//! HTTP implementation of [`RemoteClient`] with rate limiting awareness.
//!
//! Wraps reqwest with:
//! - Bearer-token authentication
//! - Rate limit tracking from response headers, throttling near the limit
//! - Retry with backoff for transport failures and 429s

use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::remote::{RemoteClient, RemoteResponse};
use super::retry::{retry_async, retry_async_when, RetryConfig};
use crate::config::{AppConfig, EnvironmentConfig, NetworkConfig};
use crate::error::{Result, SisyncError};

/// Rate limit state extracted from response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimitState {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
}

impl RateLimitState {
    /// Throttle when below 10% of the limit.
    pub fn should_throttle(&self) -> bool {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => {
                let threshold = (limit as f64 * 0.1) as u64;
                remaining < threshold.max(1)
            }
            _ => false,
        }
    }
}

/// reqwest-backed client for one environment.
pub struct HttpRemoteClient {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
    retry: RetryConfig,
    rate_limit_remaining: AtomicI64,
    rate_limit_limit: AtomicU64,
    throttle_delay: Duration,
}

impl HttpRemoteClient {
    /// Build a client from a validated environment configuration.
    pub fn from_config(config: &EnvironmentConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(AppConfig::USER_AGENT)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| SisyncError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            token: config.token.clone(),
            timeout,
            retry: RetryConfig::default(),
            rate_limit_remaining: AtomicI64::new(-1),
            rate_limit_limit: AtomicU64::new(0),
            throttle_delay: NetworkConfig::THROTTLE_DELAY,
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn rate_limit_state(&self) -> RateLimitState {
        let remaining = self.rate_limit_remaining.load(Ordering::SeqCst);
        let limit = self.rate_limit_limit.load(Ordering::SeqCst);
        RateLimitState {
            remaining: (remaining >= 0).then_some(remaining as u64),
            limit: (limit > 0).then_some(limit),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// GETs retry on any transport failure. Writes are sent once and only
    /// repeated after a 429, which the server rejected without processing.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RemoteResponse> {
        let what = format!("{} {}", method, path);
        if method == Method::GET {
            retry_async(&self.retry, &what, || self.send_once(method.clone(), path, body)).await
        } else {
            retry_async_when(
                &self.retry,
                &what,
                || self.send_once(method.clone(), path, body),
                |e| matches!(e, SisyncError::RateLimited { .. }),
            )
            .await
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RemoteResponse> {
        self.maybe_throttle().await;

        let url = self.url(path);
        debug!("{} {}", method, url);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.token)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SisyncError::Timeout(self.timeout)
            } else {
                SisyncError::Network {
                    message: format!("{} {} failed: {}", method, url, e),
                    cause: Some(e.to_string()),
                }
            }
        })?;

        self.update_rate_limits(&response);

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(SisyncError::RateLimited {
                service: extract_domain(&url),
                retry_after_secs: retry_after,
            });
        }

        let text = response.text().await.map_err(|e| SisyncError::Network {
            message: format!("Failed to read response body from {}: {}", url, e),
            cause: None,
        })?;
        let body = decode_body(&text);
        if !status.is_success() {
            debug!("{} {} returned {}", method, url, status);
        }
        Ok(RemoteResponse::new(status.as_u16(), body))
    }

    async fn maybe_throttle(&self) {
        let state = self.rate_limit_state();
        if state.should_throttle() {
            warn!(
                "Rate limit approaching (remaining: {:?}/{:?}), throttling for {:?}",
                state.remaining, state.limit, self.throttle_delay
            );
            tokio::time::sleep(self.throttle_delay).await;
        }
    }

    fn update_rate_limits(&self, response: &Response) {
        let header_num = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };
        if let Some(remaining) = header_num("X-RateLimit-Remaining") {
            self.rate_limit_remaining
                .store(remaining as i64, Ordering::SeqCst);
        }
        if let Some(limit) = header_num("X-RateLimit-Limit") {
            self.rate_limit_limit.store(limit, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get(&self, path: &str) -> Result<RemoteResponse> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<RemoteResponse> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<RemoteResponse> {
        self.send(Method::PUT, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<RemoteResponse> {
        self.send(Method::DELETE, path, None).await
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Empty bodies decode to `Null`; non-JSON text is kept as a string.
fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}
