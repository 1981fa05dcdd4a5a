pub mod config;
pub mod driver;
pub mod models;
pub mod prober;
pub mod publisher;
pub mod version;

/// Kafka topic every health check result is appended to.
pub const HEALTHCHECK_TOPIC: &str = "healthcheck";
