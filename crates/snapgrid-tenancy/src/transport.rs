//! HTTP client for the orchestrator service.
//!
//! Two operations: runtime lookup by host and credential resolution. Both
//! carry the service bearer token, an optional `X-Request-Id`, and share a
//! bounded retry loop with capped exponential backoff and jitter. The
//! lookup endpoint may only support one of two equivalent request forms
//! (POST body vs GET query); a 405 on the POST form permanently downgrades
//! this client instance to the query form.

use crate::error::UpstreamError;
use crate::model::{CredentialDocument, RuntimeEnvelope};
use rand::Rng;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Seam between the resolver and the orchestrator service.
#[async_trait::async_trait]
pub trait OrchestratorApi: Send + Sync {
    /// Look up the runtime configuration envelope for a normalized host.
    async fn fetch_runtime_by_host(
        &self,
        host: &str,
        request_id: Option<&str>,
    ) -> Result<RuntimeEnvelope, UpstreamError>;

    /// Resolve a credential reference on behalf of a tenant.
    async fn resolve_credential(
        &self,
        tenant: &str,
        reference: &str,
        request_id: Option<&str>,
    ) -> Result<CredentialDocument, UpstreamError>;
}

/// Retry budget and backoff curve shared by both operations.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff for the given zero-based attempt: exponential, capped,
    /// with uniform jitter within ±25% so tenants do not retry in step.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.75..=1.25);
        exp.mul_f64(jitter)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

/// Orchestrator client over reqwest.
pub struct HttpOrchestratorClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
    retry: RetryPolicy,
    /// Flips to false forever once the lookup endpoint answers 405 to POST.
    prefer_body: AtomicBool,
}

impl HttpOrchestratorClient {
    /// Create a client for the given base URL and service token.
    pub fn new(base_url: &str, token: &str, prefer_body_lookup: bool) -> Self {
        Self::with_retry(base_url, token, prefer_body_lookup, RetryPolicy::default())
    }

    /// Create a client with an explicit retry policy.
    pub fn with_retry(
        base_url: &str,
        token: &str,
        prefer_body_lookup: bool,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap(),
            retry,
            prefer_body: AtomicBool::new(prefer_body_lookup),
        }
    }

    fn decorate(
        &self,
        req: reqwest::RequestBuilder,
        request_id: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let req = req.bearer_auth(&self.token);
        match request_id {
            Some(id) => req.header("X-Request-Id", id),
            None => req,
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, UpstreamError> {
        resp.json::<T>()
            .await
            .map_err(|e| UpstreamError::Malformed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl OrchestratorApi for HttpOrchestratorClient {
    async fn fetch_runtime_by_host(
        &self,
        host: &str,
        request_id: Option<&str>,
    ) -> Result<RuntimeEnvelope, UpstreamError> {
        let url = format!("{}/v1/tenants/lookup", self.base_url);
        let mut attempt = 0u32;
        let mut last_err = String::new();
        while attempt < self.retry.max_attempts {
            let use_body = self.prefer_body.load(Ordering::Relaxed);
            let req = if use_body {
                self.client
                    .post(&url)
                    .json(&serde_json::json!({ "host": host }))
            } else {
                self.client.get(&url).query(&[("host", host)])
            };
            debug!(host, attempt, use_body, "runtime lookup");
            match self.decorate(req, request_id).send().await {
                Ok(resp) => match resp.status() {
                    StatusCode::OK => return Self::decode(resp).await,
                    StatusCode::NOT_FOUND => return Err(UpstreamError::NotFound),
                    StatusCode::FORBIDDEN => return Err(UpstreamError::Forbidden),
                    StatusCode::METHOD_NOT_ALLOWED if use_body => {
                        // Learned once, kept for the client's lifetime.
                        info!(host, "lookup endpoint rejected POST, switching to query form");
                        self.prefer_body.store(false, Ordering::Relaxed);
                        continue;
                    }
                    s if is_retryable(s) => last_err = format!("status {s}"),
                    s => return Err(UpstreamError::Unavailable(format!("status {s}"))),
                },
                Err(e) => last_err = e.to_string(),
            }
            attempt += 1;
            if attempt < self.retry.max_attempts {
                let delay = self.retry.delay(attempt - 1);
                warn!(host, attempt, %last_err, ?delay, "runtime lookup failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
        Err(UpstreamError::Unavailable(last_err))
    }

    async fn resolve_credential(
        &self,
        tenant: &str,
        reference: &str,
        request_id: Option<&str>,
    ) -> Result<CredentialDocument, UpstreamError> {
        let url = format!("{}/v1/credentials/resolve", self.base_url);
        let mut attempt = 0u32;
        let mut last_err = String::new();
        while attempt < self.retry.max_attempts {
            debug!(tenant, reference, attempt, "credential resolve");
            let req = self
                .client
                .post(&url)
                .header("X-Tenant", tenant)
                .json(&serde_json::json!({ "credentials_ref": reference }));
            match self.decorate(req, request_id).send().await {
                Ok(resp) => match resp.status() {
                    StatusCode::OK => return Self::decode(resp).await,
                    StatusCode::NOT_FOUND => return Err(UpstreamError::NotFound),
                    StatusCode::FORBIDDEN => return Err(UpstreamError::Forbidden),
                    s if is_retryable(s) => last_err = format!("status {s}"),
                    s => return Err(UpstreamError::Unavailable(format!("status {s}"))),
                },
                Err(e) => last_err = e.to_string(),
            }
            attempt += 1;
            if attempt < self.retry.max_attempts {
                let delay = self.retry.delay(attempt - 1);
                warn!(tenant, reference, attempt, %last_err, ?delay, "credential resolve failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }
        Err(UpstreamError::Unavailable(last_err))
    }
}
