//! Workload service HTTP client.
//!
//! Wraps the workload service's status and failure-report endpoints in a
//! pooled hyper client with a configured retry policy. Network errors and
//! 5xx responses are retried up to the policy's attempt bound, then
//! surfaced as `Connectivity`; malformed bodies and 4xx responses are
//! fatal and never retried.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

/// Result type alias for workload client operations.
pub type WorkloadResult<T> = Result<T, WorkloadClientError>;

/// Errors surfaced by the workload service client.
#[derive(Debug, Error)]
pub enum WorkloadClientError {
    #[error("workload service unreachable after {attempts} attempts: {last_error}")]
    Connectivity { attempts: u32, last_error: String },

    #[error("malformed response from workload service: {0}")]
    MalformedResponse(String),

    #[error("workload service rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Current status of a workload, as reported by the workload service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadStatus {
    Pending,
    Claimed,
    Launched,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl WorkloadStatus {
    /// Whether the workload has finished (successfully or not).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

/// Configuration for the workload service client.
#[derive(Debug, Clone)]
pub struct WorkloadClientConfig {
    /// Base URL of the workload API, e.g. `http://workload-api:8007/api/v1/workload`.
    pub base_url: String,
    /// Timeout for a single request attempt.
    pub request_timeout: Duration,
}

impl WorkloadClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Wire format of the status endpoint response.
#[derive(Debug, Deserialize)]
struct WorkloadStatusResponse {
    #[allow(dead_code)]
    id: String,
    status: WorkloadStatus,
}

/// Request body for the failure-report endpoint.
#[derive(Debug, Serialize)]
struct WorkloadFailureRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Pooled HTTP client for the workload service.
pub struct WorkloadApiClient {
    config: WorkloadClientConfig,
    retry: RetryPolicy,
    http: Client<HttpConnector, Full<Bytes>>,
}

impl WorkloadApiClient {
    /// Create a client with the given configuration and retry policy.
    ///
    /// The underlying hyper client keeps a shared connection pool; one
    /// `WorkloadApiClient` should be reused across the process.
    pub fn new(config: WorkloadClientConfig, retry: RetryPolicy) -> Self {
        let http = Client::builder(TokioExecutor::new()).build_http();
        Self {
            config,
            retry,
            http,
        }
    }

    /// Fetch the current status of a workload.
    pub async fn get_status(&self, workload_id: &str) -> WorkloadResult<WorkloadStatus> {
        let uri = self.endpoint(workload_id, "status")?;
        let body = self
            .execute("get_status", || {
                http::Request::builder()
                    .method(http::Method::GET)
                    .uri(uri.clone())
                    .body(Full::new(Bytes::new()))
                    .map_err(|e| WorkloadClientError::InvalidRequest(e.to_string()))
            })
            .await?;

        let parsed: WorkloadStatusResponse = serde_json::from_slice(&body)
            .map_err(|e| WorkloadClientError::MalformedResponse(e.to_string()))?;
        debug!(workload_id, status = ?parsed.status, "workload status fetched");
        Ok(parsed.status)
    }

    /// Report that a workload failed.
    ///
    /// Idempotent from the caller's perspective: a report against a
    /// workload that is already terminal (409/410 from the service) is
    /// treated as success.
    pub async fn report_failure(
        &self,
        workload_id: &str,
        source: Option<&str>,
        reason: Option<&str>,
    ) -> WorkloadResult<()> {
        let uri = self.endpoint(workload_id, "failure")?;
        let payload = serde_json::to_vec(&WorkloadFailureRequest { source, reason })
            .map_err(|e| WorkloadClientError::InvalidRequest(e.to_string()))?;
        let payload = Bytes::from(payload);

        self.execute("report_failure", || {
            http::Request::builder()
                .method(http::Method::POST)
                .uri(uri.clone())
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Full::new(payload.clone()))
                .map_err(|e| WorkloadClientError::InvalidRequest(e.to_string()))
        })
        .await?;

        debug!(workload_id, "workload failure reported");
        Ok(())
    }

    fn endpoint(&self, workload_id: &str, op: &str) -> WorkloadResult<http::Uri> {
        let url = format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            workload_id,
            op
        );
        url.parse::<http::Uri>()
            .map_err(|e| WorkloadClientError::InvalidRequest(format!("{url}: {e}")))
    }

    /// Send a request with the retry policy, returning the response body.
    ///
    /// Retries transport errors, timeouts, and 5xx responses. A 409 or 410
    /// counts as success (the resource is already in the reported state).
    async fn execute<F>(&self, op: &str, build: F) -> WorkloadResult<Bytes>
    where
        F: Fn() -> WorkloadResult<http::Request<Full<Bytes>>>,
    {
        let attempts = self.retry.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry.jittered_delay(attempt - 1)).await;
            }

            let req = build()?;
            let result =
                tokio::time::timeout(self.config.request_timeout, self.http.request(req)).await;

            match result {
                Ok(Ok(resp)) => {
                    let status = resp.status();
                    let body = resp
                        .into_body()
                        .collect()
                        .await
                        .map_err(|e| WorkloadClientError::MalformedResponse(e.to_string()))?
                        .to_bytes();

                    if status.is_success()
                        || status == http::StatusCode::CONFLICT
                        || status == http::StatusCode::GONE
                    {
                        return Ok(body);
                    }

                    if status.is_server_error() {
                        last_error = format!("server error {status}");
                        warn!(op, attempt, %status, "workload service error, will retry");
                        continue;
                    }

                    return Err(WorkloadClientError::Api {
                        status: status.as_u16(),
                        message: String::from_utf8_lossy(&body).into_owned(),
                    });
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(op, attempt, error = %e, "workload request failed, will retry");
                }
                Err(_) => {
                    last_error = format!(
                        "request timed out after {:?}",
                        self.config.request_timeout
                    );
                    warn!(op, attempt, "workload request timed out, will retry");
                }
            }
        }

        Err(WorkloadClientError::Connectivity {
            attempts,
            last_error,
        })
    }
}
