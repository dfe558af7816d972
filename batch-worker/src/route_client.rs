//! HTTP client for the gateway's internal routing endpoint.
//!
//! Job items go through the same registry and circuit breakers as
//! synchronous traffic; this client is the worker's only path to a backend.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use modelmesh_common::RouteRequest;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("inference failed with status {0}")]
    Status(u16),
}

/// Client for `POST /v1/route`.
pub struct RouteClient {
    base_url: String,
    http_client: Client,
}

impl RouteClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Route one item and return the raw backend payload.
    pub async fn infer(
        &self,
        request_id: &str,
        model: &str,
        version: &str,
        input: &Value,
    ) -> Result<Value, RouteError> {
        let url = format!("{}/v1/route", self.base_url);
        let request = RouteRequest {
            request_id: request_id.to_string(),
            model: model.to_string(),
            version: Some(version.to_string()),
            input: input.clone(),
        };

        let response = self
            .http_client
            .post(&url)
            .header("X-Request-ID", request_id)
            .json(&request)
            .send()
            .await
            .map_err(|e| RouteError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RouteError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| RouteError::Transport(e.to_string()))
    }
}
