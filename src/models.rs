use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `YYYY-MM-DD HH:mm:ss`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of one probe. Flattened into [`HealthCheckResult`], so the
/// published JSON stays a single flat object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProbeStatus {
    /// The target answered. Any status code lands here, 5xx included.
    Responded {
        status: u16,
        headers: BTreeMap<String, String>,
    },
    /// No response was obtained. Kept for payload compatibility with
    /// consumers of the `status`/`message` shape; the driver never
    /// publishes it, since an exhausted run publishes nothing.
    Failed { status: FailedMarker, message: String },
}

/// Serializes as the literal `"failed"` and accepts nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailedMarker {
    Failed,
}

impl ProbeStatus {
    pub fn failed(message: impl Into<String>) -> Self {
        ProbeStatus::Failed {
            status: FailedMarker::Failed,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProbeStatus::Responded { status, .. } => Some(*status),
            ProbeStatus::Failed { .. } => None,
        }
    }
}

/// Result record produced by a probe and handed to the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub timestamp: String,
    pub url: String,
    #[serde(flatten)]
    pub outcome: ProbeStatus,
    pub expected_status_code: u16,
}

impl HealthCheckResult {
    pub fn new<Tz: TimeZone>(
        completed_at: DateTime<Tz>,
        offset: &FixedOffset,
        url: impl Into<String>,
        outcome: ProbeStatus,
        expected_status_code: u16,
    ) -> Self {
        Self {
            timestamp: format_timestamp(completed_at, offset),
            url: url.into(),
            outcome,
            expected_status_code,
        }
    }

    /// Compact JSON payload as it goes onto the topic.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

pub fn format_timestamp<Tz: TimeZone>(at: DateTime<Tz>, offset: &FixedOffset) -> String {
    at.with_timezone(offset).format(TIMESTAMP_FORMAT).to_string()
}
