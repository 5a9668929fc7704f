// HTTP JSON transport
// Shared client for the remote sampler, RFQ makers and the pool metadata
// service. Transport failures and 5xx responses are retried with exponential
// backoff; any other non-success status fails immediately.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::metrics::{REQ_ERRORS, REQ_LATENCY};
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(1),
            max_elapsed_time: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed_time),
            multiplier: 2.0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base: Url,
    service: &'static str,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(base: Url, service: &'static str, timeout: Duration) -> Result<Self, AggrError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| AggrError::Transport(format!("build HTTP client for {service}: {e}")))?;
        Ok(Self { client, base, service, retry: RetryPolicy::default() })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, AggrError> {
        let joined = format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| AggrError::InvalidRequest(format!("endpoint {joined}: {e}")))
    }

    pub async fn post_json<B, T>(&self, path: &str, method: &'static str, body: &B) -> Result<T, AggrError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| AggrError::InvalidRequest(format!("encode {method} body: {e}")))?;
        self.send(Method::POST, path, method, Some(body)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, method: &'static str) -> Result<T, AggrError> {
        self.send(Method::GET, path, method, None).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        verb: Method,
        path: &str,
        method: &'static str,
        body: Option<serde_json::Value>,
    ) -> Result<T, AggrError> {
        let url = self.endpoint(path)?;
        let _timer = REQ_LATENCY
            .with_label_values(&[self.service, method])
            .start_timer();

        let result = retry(self.retry.backoff(), || {
            let mut req = self.client.request(verb.clone(), url.clone());
            if let Some(body) = &body {
                req = req.json(body);
            }
            async move {
                let resp = req.send().await.map_err(|e| {
                    debug!(error = %e, method, "http send failed, retrying");
                    backoff::Error::transient(Failure::retryable(AggrError::Transport(format!("{method}: {e}"))))
                })?;
                let status = resp.status();
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(backoff::Error::transient(Failure::retryable(AggrError::Provider(
                        format!("{method}: http {status}"),
                    ))));
                }
                if !status.is_success() {
                    return Err(backoff::Error::permanent(Failure::fatal(AggrError::Provider(format!(
                        "{method}: http {status}"
                    )))));
                }
                resp.json::<T>().await.map_err(|e| {
                    backoff::Error::permanent(Failure::fatal(AggrError::Provider(format!(
                        "{method}: decode response: {e}"
                    ))))
                })
            }
        })
        .await;

        result.map_err(|failure| {
            REQ_ERRORS.with_label_values(&[self.service, method]).inc();
            if failure.retryable {
                warn!(service = self.service, method, error = %failure.error, "retries exhausted");
                AggrError::BackoffExhausted
            } else {
                failure.error
            }
        })
    }
}

struct Failure {
    error: AggrError,
    retryable: bool,
}

impl Failure {
    fn retryable(error: AggrError) -> Self {
        Self { error, retryable: true }
    }

    fn fatal(error: AggrError) -> Self {
        Self { error, retryable: false }
    }
}
