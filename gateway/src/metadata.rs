//! Client for the model metadata service.
//!
//! Model descriptors are consumed opaquely: the only fields this service
//! cares about are the identifier and the backend URL used to seed the
//! registry. Everything else the metadata service returns is ignored.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("model descriptor not found: {0}")]
    NotFound(String),
    #[error("metadata request failed: {0}")]
    RequestFailed(String),
}

/// The subset of a model descriptor the gateway consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub backend_url: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// HTTP client for descriptor lookups.
pub struct MetadataClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl MetadataClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Fetch the descriptor for a (model, version) pair.
    pub async fn descriptor(
        &self,
        model: &str,
        version: &str,
    ) -> Result<ModelDescriptor, MetadataError> {
        let url = format!("{}/v1/models/by-name/{}/{}", self.base_url, model, version);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| MetadataError::RequestFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound(format!("{}/{}", model, version)));
        }
        if !response.status().is_success() {
            return Err(MetadataError::RequestFailed(format!(
                "metadata service returned status {}",
                response.status().as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MetadataError::RequestFailed(e.to_string()))
    }
}
