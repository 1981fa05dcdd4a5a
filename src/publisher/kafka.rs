use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::{debug, info};

use super::{Publish, PublishError};
use crate::config::KafkaSettings;
use crate::models::HealthCheckResult;

pub const CLIENT_ID: &str = "healthCheckProducer";

/// Publishes each result through a producer that lives only for that call.
pub struct KafkaPublisher {
    settings: KafkaSettings,
}

impl KafkaPublisher {
    pub fn new(settings: &KafkaSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &self.settings.bootstrap_servers);
        client_config.set("client.id", CLIENT_ID);
        client_config.set("acks", "all");
        client_config.set("linger.ms", "0");
        // Bounds the whole delivery, including connecting to the broker.
        client_config.set(
            "message.timeout.ms",
            self.settings.delivery_timeout.as_millis().to_string(),
        );
        client_config.set("security.protocol", self.settings.security_protocol());

        if let Some(credentials) = &self.settings.credentials {
            client_config.set("sasl.mechanism", "PLAIN");
            client_config.set("sasl.username", &credentials.username);
            client_config.set("sasl.password", &credentials.password);
        }

        client_config
    }
}

#[async_trait]
impl Publish for KafkaPublisher {
    async fn publish(&self, result: &HealthCheckResult, topic: &str) -> Result<(), PublishError> {
        let payload = result.to_payload()?;

        let producer: FutureProducer = self
            .client_config()
            .create()
            .map_err(|e| PublishError::ClientCreation(e.to_string()))?;
        debug!(topic, bytes = payload.len(), "Sending health check result.");

        let record = FutureRecord::to(topic).key(result.url.as_str()).payload(&payload);
        match producer.send(record, self.settings.delivery_timeout).await {
            Ok(delivery) => {
                info!(topic, delivery = ?delivery, "Published health check result.");
            }
            Err((e, _unsent)) => {
                return Err(PublishError::Delivery {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        producer
            .flush(self.settings.delivery_timeout)
            .map_err(|e| PublishError::Flush(e.to_string()))?;
        Ok(())
    }
}
