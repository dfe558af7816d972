//! Durable-log subscriber driving the executor.
//!
//! Delivery is at-least-once: the offset is committed only after the
//! executor has driven the job to a terminal state, so a crash mid-job
//! re-delivers the descriptor and the executor's idempotency contract takes
//! over. Malformed messages are logged and committed, never retried.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::Message;
use tokio::sync::watch;

use modelmesh_common::{JobDescriptor, JobRecord, JobStore};

use crate::config::KafkaConfig;
use crate::error::{Result, WorkerError};
use crate::executor::JobExecutor;

/// Parse a log message payload into a job descriptor.
pub(crate) fn parse_descriptor(payload: &[u8]) -> std::result::Result<JobDescriptor, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Long-running subscriber to the batch job topic.
pub struct JobConsumer {
    consumer: StreamConsumer,
    topic: String,
    executor: Arc<JobExecutor>,
    store: Arc<dyn JobStore>,
    shutdown: watch::Receiver<bool>,
}

impl JobConsumer {
    pub fn new(
        config: &KafkaConfig,
        executor: Arc<JobExecutor>,
        store: Arc<dyn JobStore>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| WorkerError::Consumer(e.to_string()))?;

        consumer
            .subscribe(&[&config.topic])
            .map_err(|e| WorkerError::Consumer(e.to_string()))?;

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
            executor,
            store,
            shutdown,
        })
    }

    /// Consume until shutdown is signalled. The in-flight job drains through
    /// the executor's cancellation path before this returns.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(topic = %self.topic, "starting job consumer");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("shutting down job consumer");
                        break;
                    }
                }
                message = self.consumer.recv() => match message {
                    Ok(message) => self.handle_message(&message).await,
                    Err(e) => {
                        tracing::error!("consumer error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_message(&self, message: &BorrowedMessage<'_>) {
        let Some(payload) = message.payload() else {
            self.commit(message);
            return;
        };

        let descriptor = match parse_descriptor(payload) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                // Poison pill: drop it, there is no point re-reading it.
                tracing::warn!(
                    offset = message.offset(),
                    "dropping malformed job descriptor: {}",
                    e
                );
                self.commit(message);
                return;
            }
        };

        tracing::info!(
            job_id = %descriptor.job_id,
            offset = message.offset(),
            "received job descriptor"
        );

        let record = JobRecord::pending(
            &descriptor.job_id,
            &descriptor.model,
            &descriptor.version,
            descriptor.inputs.clone(),
            descriptor.created_at,
        );

        if let Err(e) = self.store.create(&record).await {
            tracing::error!(job_id = %descriptor.job_id, "failed to create job record: {}", e);
        } else if let Err(e) = self.executor.execute(&descriptor).await {
            tracing::error!(job_id = %descriptor.job_id, "job execution failed: {}", e);
        }

        self.commit(message);
    }

    fn commit(&self, message: &BorrowedMessage<'_>) {
        if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
            tracing::warn!("offset commit failed: {}", e);
        }
    }
}
