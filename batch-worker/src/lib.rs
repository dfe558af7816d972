//! ModelMesh batch worker: consumes job descriptors from the durable log,
//! fans items out across a worker pool, and records results durably.

pub mod config;
pub mod consumer;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod route_client;

pub use config::Config;
pub use consumer::JobConsumer;
pub use error::WorkerError;
pub use executor::JobExecutor;
pub use manifest::{ManifestStore, MemoryManifestStore, S3ManifestStore};
pub use route_client::{RouteClient, RouteError};
