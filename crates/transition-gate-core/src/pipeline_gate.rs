//! Outbound approve/deny calls to the pipeline-control API.

use crate::config::{endpoint_url, PipelineConfig};
use crate::{Action, SecretValue};
use async_trait::async_trait;
use tracing::{info, instrument};
use url::Url;

/// Transport-level failures of a gate call.
///
/// A non-2xx response is not an error at this layer; its status code is
/// returned to the caller like any other.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Pipeline gate request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Pipeline gate request to {endpoint} timed out")]
    Timeout { endpoint: String },
}

/// Interface for submitting approve/deny decisions
#[async_trait]
pub trait PipelineGate: Send + Sync {
    /// Submit `action` for the pending approval of `workflow_id` and return
    /// the remote status code.
    async fn invoke(&self, action: Action, workflow_id: &str) -> Result<u16, GateError>;
}

/// HTTP client for the pipeline-control API.
///
/// Calls `GET {base}/api/workflow/{workflow_id}/pending-approval/{action}`
/// with the configured token as the raw `Authorization` header value.
pub struct PipelineGateClient {
    http_client: reqwest::Client,
    endpoint: Url,
    token: SecretValue,
}

impl PipelineGateClient {
    pub fn new(http_client: reqwest::Client, config: &PipelineConfig) -> Self {
        Self {
            http_client,
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
        }
    }

    /// URL of the pending-approval decision for a workflow.
    ///
    /// The workflow id is percent-encoded as a single path segment.
    pub fn decision_url(&self, action: Action, workflow_id: &str) -> Url {
        endpoint_url(
            &self.endpoint,
            &[
                "api",
                "workflow",
                workflow_id,
                "pending-approval",
                action.as_str(),
            ],
        )
    }
}

impl std::fmt::Debug for PipelineGateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGateClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &self.token)
            .finish()
    }
}

#[async_trait]
impl PipelineGate for PipelineGateClient {
    #[instrument(skip(self))]
    async fn invoke(&self, action: Action, workflow_id: &str) -> Result<u16, GateError> {
        let url = self.decision_url(action, workflow_id);
        let endpoint = url.to_string();

        info!(%action, workflow_id, "Submitting pipeline decision");

        let response = self
            .http_client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GateError::Timeout {
                        endpoint: endpoint.clone(),
                    }
                } else {
                    GateError::Transport {
                        endpoint: endpoint.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        info!(%action, workflow_id, status, "Pipeline gate responded");

        Ok(status)
    }
}

#[cfg(test)]
#[path = "pipeline_gate_tests.rs"]
mod tests;
