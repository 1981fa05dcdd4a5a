//! Single-shot HTTP probe against the configured target.
use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::HealthCheckConfig;
use crate::models::{HealthCheckResult, ProbeStatus};
use crate::version::user_agent;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("Request to {url} failed: {cause}")]
    Request { url: String, cause: String },
}

/// One health probe. Implementations never retry internally.
#[async_trait]
pub trait Probe {
    async fn probe(&self) -> Result<HealthCheckResult, ProbeError>;
}

pub struct HttpProber {
    client: Client,
    method: Method,
    target_url: String,
    timeout: Duration,
    expected_status_code: u16,
    timestamp_offset: FixedOffset,
}

impl HttpProber {
    pub fn new(config: &HealthCheckConfig) -> Result<Self, ProbeError> {
        // Redirects are followed; the final status is what gets recorded.
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(user_agent())
            .build()
            .map_err(|e| ProbeError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            method: config.http_method.clone(),
            target_url: config.target_url.clone(),
            timeout: config.request_timeout,
            expected_status_code: config.expected_status_code,
            timestamp_offset: config.timestamp_offset,
        })
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self) -> Result<HealthCheckResult, ProbeError> {
        let start_time = Instant::now();
        let response = self
            .client
            .request(self.method.clone(), &self.target_url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout {
                        url: self.target_url.clone(),
                        timeout: self.timeout,
                    }
                } else {
                    ProbeError::Request {
                        url: self.target_url.clone(),
                        cause: error_chain(&e),
                    }
                }
            })?;
        let response_time_ms = start_time.elapsed().as_millis() as u64;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        if status != self.expected_status_code {
            debug!(
                url = %self.target_url,
                status,
                expected = self.expected_status_code,
                "Status differs from expected; recording it as-is."
            );
        }
        info!(url = %self.target_url, status, response_time_ms, "Probe completed.");

        Ok(HealthCheckResult::new(
            Utc::now(),
            &self.timestamp_offset,
            self.target_url.clone(),
            ProbeStatus::Responded { status, headers },
            self.expected_status_code,
        ))
    }
}

/// reqwest's top-level message hides the cause (DNS, refused, ...).
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}
