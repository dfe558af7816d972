//! Error types for the batch worker.

use modelmesh_common::JobStoreError;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("job store error: {0}")]
    Store(#[from] JobStoreError),
    #[error("log consumer error: {0}")]
    Consumer(String),
    #[error("manifest upload failed: {0}")]
    Manifest(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
