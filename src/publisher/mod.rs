use async_trait::async_trait;
use thiserror::Error;

use crate::models::HealthCheckResult;

pub mod kafka;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize result: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to create broker client: {0}")]
    ClientCreation(String),
    #[error("Failed to deliver message to topic '{topic}': {reason}")]
    Delivery { topic: String, reason: String },
    #[error("Failed to flush producer: {0}")]
    Flush(String),
}

/// Delivers result records to a broker topic.
///
/// Every call sends at most one message and holds no connection past
/// its own return.
#[async_trait]
pub trait Publish {
    async fn publish(&self, result: &HealthCheckResult, topic: &str) -> Result<(), PublishError>;
}
