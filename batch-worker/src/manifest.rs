//! Manifest persistence in object storage.
//!
//! The manifest is the ordered, immutable record of per-item results for one
//! job, written once at the terminal transition. The write is a blind put
//! keyed on the job id, so at-least-once job delivery converges on a single
//! consistent object.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;

use modelmesh_common::ItemResult;

use crate::config::ObjectStoreConfig;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to encode manifest: {0}")]
    Encode(String),
    #[error("failed to upload manifest: {0}")]
    Upload(String),
    #[error("failed to presign result URL: {0}")]
    Presign(String),
}

/// Sink for finished-job manifests.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Write the ordered manifest and return a time-bounded retrieval URL.
    async fn upload(&self, job_id: &str, results: &[ItemResult]) -> Result<String, ManifestError>;
}

/// S3-compatible manifest store used in production.
pub struct S3ManifestStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    url_ttl: Duration,
}

impl S3ManifestStore {
    pub async fn new(config: &ObjectStoreConfig) -> Result<Self, ManifestError> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "modelmesh",
            ));
        }

        let sdk_config = loader.load().await;
        // Path-style addressing keeps MinIO and other S3-compatible stores working.
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_config);

        let store = Self {
            client,
            bucket: config.bucket.clone(),
            url_ttl: Duration::from_secs(config.url_ttl_secs),
        };
        store.ensure_bucket().await?;

        Ok(store)
    }

    async fn ensure_bucket(&self) -> Result<(), ManifestError> {
        let exists = self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok();

        if !exists {
            self.client
                .create_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| ManifestError::Upload(format!("failed to create bucket: {}", e)))?;
            tracing::info!(bucket = %self.bucket, "created results bucket");
        }

        Ok(())
    }

    fn object_key(job_id: &str) -> String {
        format!("results/{}.json", job_id)
    }
}

#[async_trait]
impl ManifestStore for S3ManifestStore {
    async fn upload(&self, job_id: &str, results: &[ItemResult]) -> Result<String, ManifestError> {
        let data =
            serde_json::to_vec_pretty(results).map_err(|e| ManifestError::Encode(e.to_string()))?;
        let key = Self::object_key(job_id);
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/json")
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| ManifestError::Upload(e.to_string()))?;

        let presigning = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| ManifestError::Presign(e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| ManifestError::Presign(e.to_string()))?;

        tracing::info!(job_id, object = %key, size_bytes = size, "uploaded results manifest");

        Ok(presigned.uri().to_string())
    }
}

/// In-memory manifest store for tests.
#[derive(Default)]
pub struct MemoryManifestStore {
    manifests: Mutex<HashMap<String, Vec<ItemResult>>>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manifest(&self, job_id: &str) -> Option<Vec<ItemResult>> {
        self.manifests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.manifests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn upload(&self, job_id: &str, results: &[ItemResult]) -> Result<String, ManifestError> {
        self.manifests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.to_string(), results.to_vec());
        Ok(format!("memory://results/{}.json", job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_object_key_layout() {
        assert_eq!(
            S3ManifestStore::object_key("job-1"),
            "results/job-1.json"
        );
    }

    #[tokio::test]
    async fn test_memory_store_is_last_writer_wins() {
        let store = MemoryManifestStore::new();
        let first = vec![ItemResult {
            input: json!({"a": 1}),
            prediction: Value::Null,
            latency_ms: 1,
            error: Some("boom".to_string()),
        }];
        let second = vec![ItemResult {
            input: json!({"a": 1}),
            prediction: json!({"p": 2}),
            latency_ms: 2,
            error: None,
        }];

        store.upload("job-1", &first).await.unwrap();
        let url = store.upload("job-1", &second).await.unwrap();

        assert_eq!(url, "memory://results/job-1.json");
        let manifest = store.manifest("job-1").unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest[0].error.is_none());
    }
}
