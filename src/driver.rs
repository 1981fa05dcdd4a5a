//! Retry-then-publish control flow.
//!
//! ```text
//! Attempting(0) ──ok──▶ Succeeded ──publish──▶ exit 0 / exit 1
//!      │ err (n < k-1, sleep delay)
//!      ▼
//! Attempting(n+1) ... ──err (n = k-1)──▶ Exhausted ──▶ exit 1
//! ```
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::HealthCheckConfig;
use crate::models::HealthCheckResult;
use crate::prober::{Probe, ProbeError};
use crate::publisher::{Publish, PublishError};

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Health check failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: ProbeError },
    #[error("Failed to publish health check result: {0}")]
    Publish(#[from] PublishError),
}

impl RunError {
    pub fn exit_code(&self) -> u8 {
        1
    }
}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of probe attempts, at least one.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &HealthCheckConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }

    /// Whether another attempt follows a failure of attempt `n` (zero-based).
    pub fn should_retry(&self, n: u32) -> bool {
        n + 1 < self.max_attempts
    }
}

#[derive(Debug)]
enum DriverState {
    Attempting(u32),
    Succeeded { attempts: u32, result: HealthCheckResult },
    Exhausted { attempts: u32, last_error: ProbeError },
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub attempts: u32,
    pub published: HealthCheckResult,
}

/// Probes until the first success or until the policy is exhausted, then
/// publishes the successful result exactly once. Neither a failed publish
/// nor a probe after success is ever retried.
pub async fn run<P, B>(
    prober: &P,
    publisher: &B,
    policy: RetryPolicy,
    topic: &str,
) -> Result<RunOutcome, RunError>
where
    P: Probe + Sync + ?Sized,
    B: Publish + Sync + ?Sized,
{
    let mut state = DriverState::Attempting(0);

    loop {
        state = match state {
            DriverState::Attempting(n) => {
                info!(attempt = n + 1, max_attempts = policy.max_attempts, "Probing target.");
                match prober.probe().await {
                    Ok(result) => DriverState::Succeeded {
                        attempts: n + 1,
                        result,
                    },
                    Err(e) if policy.should_retry(n) => {
                        warn!(
                            attempt = n + 1,
                            error = %e,
                            delay_seconds = policy.delay.as_secs_f64(),
                            "Probe failed, retrying after delay."
                        );
                        tokio::time::sleep(policy.delay).await;
                        DriverState::Attempting(n + 1)
                    }
                    Err(e) => DriverState::Exhausted {
                        attempts: n + 1,
                        last_error: e,
                    },
                }
            }
            DriverState::Succeeded { attempts, result } => {
                return match publisher.publish(&result, topic).await {
                    Ok(()) => {
                        info!(attempts, topic, url = %result.url, "Health check result published.");
                        Ok(RunOutcome {
                            attempts,
                            published: result,
                        })
                    }
                    Err(e) => Err(RunError::Publish(e)),
                };
            }
            // Terminal errors are reported once, by the caller.
            DriverState::Exhausted { attempts, last_error } => {
                return Err(RunError::Exhausted { attempts, last_error });
            }
        };
    }
}
