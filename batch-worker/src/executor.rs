//! Fan-out executor for batch jobs.
//!
//! A job's items are distributed across a fixed pool of worker tasks, each
//! calling the router. Results land in an index-addressed buffer so the
//! manifest preserves input order regardless of completion order. Progress is
//! checkpointed to the job store at a configurable granularity, and the
//! manifest is written exactly once at the terminal transition.
//!
//! The executor tolerates re-delivery: a job already in a terminal state is
//! a no-op, and a job left in `processing` by a prior incarnation restarts
//! from zero. The manifest write is a blind put, so the last writer wins.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};

use modelmesh_common::{ItemResult, JobDescriptor, JobStatus, JobStore};

use crate::error::{Result, WorkerError};
use crate::manifest::ManifestStore;
use crate::route_client::RouteClient;

/// Fixed-width fan-out executor.
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    manifests: Arc<dyn ManifestStore>,
    route_client: Arc<RouteClient>,
    workers: usize,
    cancel: watch::Receiver<bool>,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        manifests: Arc<dyn ManifestStore>,
        route_client: Arc<RouteClient>,
        workers: usize,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            manifests,
            route_client,
            workers: workers.max(1),
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Drive a job to a terminal state. Safe to invoke more than once for
    /// the same job id.
    pub async fn execute(&self, descriptor: &JobDescriptor) -> Result<()> {
        let job_id = descriptor.job_id.as_str();
        let total = descriptor.inputs.len();

        if let Ok(existing) = self.store.get(job_id).await {
            if existing.status.is_terminal() {
                tracing::info!(
                    job_id,
                    status = existing.status.as_str(),
                    "job already in terminal state, skipping"
                );
                return Ok(());
            }
        }

        if total == 0 {
            self.store
                .update_status(job_id, JobStatus::Failed, None, Some("job has no inputs"))
                .await?;
            return Ok(());
        }

        tracing::info!(
            job_id,
            total_items = total,
            workers = self.workers,
            "processing batch job"
        );
        self.store
            .update_status(job_id, JobStatus::Processing, None, None)
            .await?;

        let (results, completed, failed_items) = self.fan_out(descriptor).await;

        if self.cancelled() && completed < total {
            tracing::warn!(job_id, completed, total, "job cancelled before completion");
            self.store
                .update_status(
                    job_id,
                    JobStatus::Failed,
                    None,
                    Some("job cancelled during shutdown"),
                )
                .await?;
            return Ok(());
        }

        // Materialize the ordered manifest. Every slot is filled on the
        // normal path; a missing slot means a worker died, which counts as
        // an item failure rather than a lost input.
        let mut ordered = Vec::with_capacity(total);
        for (index, slot) in results.into_iter().enumerate() {
            match slot {
                Some(item) => ordered.push(item),
                None => ordered.push(ItemResult {
                    input: descriptor.inputs[index].clone(),
                    prediction: Value::Null,
                    latency_ms: 0,
                    error: Some("item was not processed".to_string()),
                }),
            }
        }

        let result_url = match self.manifests.upload(job_id, &ordered).await {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(job_id, "failed to upload results: {}", e);
                self.store
                    .update_status(job_id, JobStatus::Failed, None, Some(&e.to_string()))
                    .await?;
                return Err(WorkerError::Manifest(e.to_string()));
            }
        };

        let (final_status, error_msg) = if failed_items == total {
            (
                JobStatus::Failed,
                Some(format!("{}/{} items failed", failed_items, total)),
            )
        } else if failed_items > 0 {
            (
                JobStatus::Completed,
                Some(format!("{}/{} items failed", failed_items, total)),
            )
        } else {
            (JobStatus::Completed, None)
        };

        // A failed job carries an error summary instead of a result URL.
        let url = (final_status == JobStatus::Completed).then_some(result_url.as_str());
        self.store
            .update_status(job_id, final_status, url, error_msg.as_deref())
            .await?;

        tracing::info!(
            job_id,
            status = final_status.as_str(),
            total_items = total,
            errors = failed_items,
            "batch job finished"
        );

        Ok(())
    }

    /// Distribute items across the pool and collect results in input order.
    /// Returns the index-addressed buffer, the completion count, and the
    /// failed-item count.
    async fn fan_out(&self, descriptor: &JobDescriptor) -> (Vec<Option<ItemResult>>, usize, usize) {
        let job_id = descriptor.job_id.clone();
        let total = descriptor.inputs.len();

        let (input_tx, input_rx) = mpsc::channel::<(usize, Value)>(total);
        let input_rx = Arc::new(Mutex::new(input_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, ItemResult)>(total);

        // Feeder stops dispatching as soon as cancellation is observed.
        let feeder = {
            let inputs = descriptor.inputs.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                for (index, input) in inputs.into_iter().enumerate() {
                    if *cancel.borrow() {
                        break;
                    }
                    if input_tx.send((index, input)).await.is_err() {
                        break;
                    }
                }
            })
        };

        let mut workers = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let input_rx = input_rx.clone();
            let result_tx = result_tx.clone();
            let route_client = self.route_client.clone();
            let cancel = self.cancel.clone();
            let model = descriptor.model.clone();
            let version = descriptor.version.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    if *cancel.borrow() {
                        break;
                    }
                    let next = { input_rx.lock().await.recv().await };
                    let Some((index, input)) = next else { break };

                    let result = run_item(&route_client, &model, &version, input).await;
                    if result_tx.send((index, result)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut results: Vec<Option<ItemResult>> = vec![None; total];
        let mut completed = 0usize;
        let mut failed_items = 0usize;
        let checkpoint_every = std::cmp::max(1, total / 10);

        while let Some((index, item)) = result_rx.recv().await {
            if item.error.is_some() {
                failed_items += 1;
            }
            results[index] = Some(item);
            completed += 1;

            if completed % checkpoint_every == 0 || completed == total {
                let progress = completed as f64 / total as f64;
                if let Err(e) = self
                    .store
                    .update_progress(&job_id, completed, progress)
                    .await
                {
                    tracing::error!(job_id = %job_id, "failed to update progress: {}", e);
                }
                tracing::info!(
                    job_id = %job_id,
                    completed,
                    total,
                    progress,
                    "batch job progress"
                );
            }
        }

        for worker in workers {
            let _ = worker.await;
        }
        let _ = feeder.await;

        (results, completed, failed_items)
    }
}

/// Execute one item through the router. Every input yields exactly one
/// result; failures are captured per item and never abort the job.
async fn run_item(
    route_client: &RouteClient,
    model: &str,
    version: &str,
    input: Value,
) -> ItemResult {
    let start = Instant::now();
    let request_id = modelmesh_common::request_id();

    match route_client.infer(&request_id, model, version, &input).await {
        Ok(prediction) => ItemResult {
            input,
            prediction,
            latency_ms: start.elapsed().as_millis() as u64,
            error: None,
        },
        Err(e) => ItemResult {
            input,
            prediction: Value::Null,
            latency_ms: start.elapsed().as_millis() as u64,
            error: Some(e.to_string()),
        },
    }
}
