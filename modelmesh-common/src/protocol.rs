//! Wire types shared between the gateway and the batch worker.
//!
//! These are the JSON shapes that cross process boundaries: the client-facing
//! request and response bodies, the job descriptor published to the durable
//! log, and the per-item result recorded in the manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle states of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether this status ends the job's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Batch job descriptor published to the durable log.
///
/// The message key is the job id; the value is this struct as JSON. Delivery
/// is at-least-once, so consumers must tolerate duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub model: String,
    pub version: String,
    pub inputs: Vec<Value>,
    pub created_at: DateTime<Utc>,
}

/// Result of a single batch item.
///
/// Every input produces exactly one of these, and the manifest preserves the
/// positional index of the input that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    /// The original input record, kept for correlation at read time.
    pub input: Value,
    /// The backend's prediction payload, or null when the item failed.
    pub prediction: Value,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /v1/infer` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferRequest {
    pub model: String,
    #[serde(default)]
    pub version: Option<String>,
    pub input: Value,
}

/// `POST /v1/infer` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferResponse {
    pub request_id: String,
    pub model: String,
    pub version: String,
    pub prediction: Value,
    pub latency_ms: u64,
}

/// `POST /v1/batch` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub model: String,
    #[serde(default)]
    pub version: Option<String>,
    pub inputs: Vec<Value>,
}

/// `202 Accepted` body for a submitted batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

/// `GET /v1/batch/{id}` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusBody {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    pub total_items: usize,
    pub completed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Internal `POST /v1/route` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    pub request_id: String,
    pub model: String,
    #[serde(default)]
    pub version: Option<String>,
    pub input: Value,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    /// Non-sensitive diagnostic hint, e.g. which field failed validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
