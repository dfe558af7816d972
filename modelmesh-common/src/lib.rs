//! ModelMesh Common Types
//!
//! Shared types used by both the gateway and the batch worker: wire protocol
//! bodies, the batch job store, and identifier generation.

pub mod ids;
pub mod jobs;
pub mod protocol;

pub use ids::{job_id, request_id};
pub use jobs::{JobRecord, JobStore, JobStoreError, MemoryJobStore, SqliteJobStore};
pub use protocol::{
    BatchAccepted, BatchRequest, ErrorBody, InferRequest, InferResponse, ItemResult,
    JobDescriptor, JobStatus, JobStatusBody, RouteRequest,
};
