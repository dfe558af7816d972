//! Publishing job descriptors onto the durable log.
//!
//! The gateway is not the system of record for jobs: submission ends with a
//! successful produce, and the consumer builds the job record from the
//! descriptor. Messages are keyed by job id so re-partitioning keeps one
//! job's deliveries ordered.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use thiserror::Error;

use modelmesh_common::JobDescriptor;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode job descriptor: {0}")]
    Encode(String),
    #[error("failed to produce to log: {0}")]
    Produce(String),
}

/// Sink for batch job descriptors.
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, descriptor: &JobDescriptor) -> Result<(), PublishError>;
}

/// Kafka-backed publisher used in production.
pub struct KafkaJobPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaJobPublisher {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "30000")
            .set("acks", "all")
            .create()
            .map_err(|e| PublishError::Produce(e.to_string()))?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl JobPublisher for KafkaJobPublisher {
    async fn publish(&self, descriptor: &JobDescriptor) -> Result<(), PublishError> {
        let payload =
            serde_json::to_vec(descriptor).map_err(|e| PublishError::Encode(e.to_string()))?;

        let record = FutureRecord::to(&self.topic)
            .payload(&payload)
            .key(&descriptor.job_id);

        let (partition, offset) = self
            .producer
            .send(record, Duration::from_secs(10))
            .await
            .map_err(|(e, _)| PublishError::Produce(e.to_string()))?;

        tracing::info!(
            job_id = %descriptor.job_id,
            partition,
            offset,
            "published job descriptor"
        );

        Ok(())
    }
}
