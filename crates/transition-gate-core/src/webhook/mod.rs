//! # Webhook Processing Module
//!
//! Handles a single issue-transition delivery from the tracker:
//!
//! 1. authenticate the `webhook_secret` query parameter;
//! 2. acknowledge non-POST deliveries without processing;
//! 3. decode the payload and filter it by event type;
//! 4. walk the changelog in order, mapping each new state to an action,
//!    resolving the custom field, reading the workflow id and submitting the
//!    decision to the pipeline gate.
//!
//! Items are processed strictly one after another: each gate call completes
//! before the next item is looked at. A transport failure on one item is
//! recorded in the [`ProcessingReport`] and processing continues with the
//! next item.

mod payload;
mod processing_output;

pub use payload::{ChangeItem, Changelog, Issue, WebhookPayload};
pub use processing_output::{
    ApprovalOutcome, Disposition, IgnoreReason, ItemOutcome, ProcessingReport, WebhookResponse,
};

use crate::config::{ConfigError, GateConfig};
use crate::field_resolver::{build_field_resolver, FieldResolver};
use crate::pipeline_gate::{PipelineGate, PipelineGateClient};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::{Choice, ConstantTimeEq};
use tracing::{debug, error, info, instrument, warn};

/// Query parameter carrying the shared webhook secret
pub const WEBHOOK_SECRET_PARAM: &str = "webhook_secret";

// ============================================================================
// Core Types
// ============================================================================

/// Raw inbound delivery as handed over by the HTTP layer
#[derive(Debug, Clone)]
pub struct InboundWebhookRequest {
    pub method: String,
    pub query_params: HashMap<String, String>,
    pub body: Bytes,
}

impl InboundWebhookRequest {
    pub fn new(
        method: impl Into<String>,
        query_params: HashMap<String, String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            method: method.into(),
            query_params,
            body: body.into(),
        }
    }

    /// Get a query parameter
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.query(WEBHOOK_SECRET_PARAM)
    }

    pub fn issue_id(&self) -> Option<&str> {
        self.query("issue_id")
    }

    pub fn issue_key(&self) -> Option<&str> {
        self.query("issue_key")
    }

    pub fn project_key(&self) -> Option<&str> {
        self.query("project_key")
    }

    pub fn is_post(&self) -> bool {
        self.method.eq_ignore_ascii_case("POST")
    }

    /// Query parameters safe to log
    fn loggable_query(&self) -> HashMap<&str, &str> {
        self.query_params
            .iter()
            .filter(|(name, _)| name.as_str() != WEBHOOK_SECRET_PARAM)
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }
}

/// Webhook processing errors
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

// ============================================================================
// WebhookProcessor
// ============================================================================

/// Orchestrates authentication, filtering and decision submission for one
/// delivery.
#[derive(Clone)]
pub struct WebhookProcessor {
    config: Arc<GateConfig>,
    field_resolver: Arc<dyn FieldResolver>,
    gate: Arc<dyn PipelineGate>,
}

impl WebhookProcessor {
    /// Create a processor from explicit collaborators
    pub fn new(
        config: Arc<GateConfig>,
        field_resolver: Arc<dyn FieldResolver>,
        gate: Arc<dyn PipelineGate>,
    ) -> Self {
        Self {
            config,
            field_resolver,
            gate,
        }
    }

    /// Create a processor with HTTP-backed collaborators.
    ///
    /// Both outbound clients share one connection pool and are bounded by
    /// the configured request timeout.
    pub fn from_config(config: Arc<GateConfig>) -> Result<Self, ConfigError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("transition-gate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "http".to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let field_resolver = build_field_resolver(&config, http_client.clone());
        let gate = Arc::new(PipelineGateClient::new(http_client, &config.pipeline));

        Ok(Self::new(config, field_resolver, gate))
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Check the `webhook_secret` query parameter.
    ///
    /// With no secrets configured every request is accepted. Otherwise the
    /// parameter must equal one of the configured secrets; comparisons run
    /// in constant time.
    pub fn authenticate(&self, request: &InboundWebhookRequest) -> bool {
        if !self.config.requires_authentication() {
            return true;
        }

        let Some(provided) = request.webhook_secret() else {
            return false;
        };

        self.config
            .webhook_secrets
            .iter()
            .fold(Choice::from(0), |matched, secret| {
                matched | secret.expose_secret().as_bytes().ct_eq(provided.as_bytes())
            })
            .into()
    }

    /// Whether the delivery's event type is in the allowlist
    pub fn filter_event(&self, payload: &WebhookPayload) -> bool {
        let event_type = self.config.normalization.normalize(payload.event_type());
        self.config.event_types.contains(&event_type)
    }

    /// Process every changelog item in delivery order.
    ///
    /// Each item is finished, including its gate call, before the next one
    /// starts.
    pub async fn process_changelog(
        &self,
        request: &InboundWebhookRequest,
        payload: &WebhookPayload,
    ) -> ProcessingReport {
        let mut report = ProcessingReport::new();

        for item in payload.change_items() {
            debug!(
                issue_id = request.issue_id().unwrap_or_default(),
                issue_key = request.issue_key().unwrap_or_default(),
                field = item.field.as_deref().unwrap_or_default(),
                to_state = item.to_state().unwrap_or_default(),
                "Issue changed"
            );

            let outcome = self.process_item(payload, item).await;
            report.push(outcome);
        }

        report
    }

    async fn process_item(&self, payload: &WebhookPayload, item: &ChangeItem) -> ItemOutcome {
        let to_state = item.to_state();
        let action = to_state
            .map(|state| self.config.normalization.normalize(state))
            .and_then(|state| self.config.state_actions.action_for(&state));

        let Some(action) = action else {
            debug!(
                to_state = to_state.unwrap_or_default(),
                "State maps to no action; skipping"
            );
            return ItemOutcome::NoAction {
                to_state: to_state.map(str::to_string),
            };
        };

        let field = match self.field_resolver.resolve().await {
            Ok(field) => field,
            Err(e) => {
                error!(%action, error = %e, "Failed to resolve custom field");
                return ItemOutcome::Failed {
                    action,
                    workflow_id: None,
                    error: e.to_string(),
                };
            }
        };

        let Some(workflow_id) = payload.workflow_id(&field.id) else {
            warn!(
                %action,
                field_id = %field.id,
                "Issue has no workflow id in the custom field; skipping"
            );
            return ItemOutcome::MissingWorkflowId {
                action,
                field_id: field.id,
            };
        };

        match self.gate.invoke(action, &workflow_id).await {
            Ok(status_code) => ItemOutcome::Submitted(ApprovalOutcome {
                action,
                workflow_id,
                status_code,
            }),
            Err(e) => {
                error!(%action, workflow_id = %workflow_id, error = %e, "Pipeline gate call failed");
                ItemOutcome::Failed {
                    action,
                    workflow_id: Some(workflow_id),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Handle a complete delivery.
    ///
    /// Returns [`WebhookError::MalformedPayload`] only for an authenticated
    /// POST whose body is not valid JSON.
    #[instrument(skip_all, fields(method = %request.method))]
    pub async fn handle(
        &self,
        request: InboundWebhookRequest,
    ) -> Result<Disposition, WebhookError> {
        info!(
            issue_id = request.issue_id().unwrap_or_default(),
            issue_key = request.issue_key().unwrap_or_default(),
            project_key = request.project_key().unwrap_or_default(),
            "New webhook request"
        );
        debug!(query = ?request.loggable_query(), "Webhook query parameters");

        if !self.authenticate(&request) {
            warn!("Webhook secret missing or not recognised; access denied");
            return Ok(Disposition::Denied);
        }

        if !request.is_post() {
            info!("Only POST deliveries are processed; acknowledging");
            return Ok(Disposition::Ignored(IgnoreReason::MethodNotProcessed));
        }

        let payload: WebhookPayload = serde_json::from_slice(&request.body)?;
        debug!(?payload, "Webhook payload");

        if !self.filter_event(&payload) {
            info!(
                event_type = payload.event_type(),
                "Event type is not configured for processing"
            );
            return Ok(Disposition::Ignored(IgnoreReason::EventTypeNotAllowed));
        }

        let report = self.process_changelog(&request, &payload).await;

        info!(
            items = report.len(),
            submitted = report.submitted().count(),
            failures = report.failure_count(),
            "Processing request finished"
        );

        Ok(Disposition::Processed(report))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
