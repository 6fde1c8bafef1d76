//! # Transition Gate Core
//!
//! Core business logic for the issue-transition approval gate.
//!
//! The gate receives issue-transition webhooks from an issue tracker, maps the
//! new issue state onto an approve or deny decision, and submits that decision
//! to a pipeline-control API for the workflow run referenced by a custom field
//! on the issue.
//!
//! ## Architecture
//!
//! - [`config::GateConfig`] is validated once at start-up and shared read-only.
//! - [`field_resolver::FieldResolver`] finds the custom field holding the workflow id.
//! - [`pipeline_gate::PipelineGate`] submits approve/deny decisions.
//! - [`webhook::WebhookProcessor`] orchestrates a single webhook delivery.
//!
//! Outbound collaborators sit behind traits so that the processor can be
//! exercised without a network.
//!
//! ## Usage
//!
//! ```rust
//! use transition_gate_core::Action;
//!
//! assert_eq!(Action::Approve.as_str(), "approve");
//! assert_eq!(Action::Deny.to_string(), "deny");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

// ============================================================================
// Domain Types
// ============================================================================

/// Decision submitted to the pipeline-control API.
///
/// The serialized form is embedded verbatim in the request path, so the
/// variants must render as exactly `approve` and `deny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Approve,
    Deny,
}

impl Action {
    /// Path token for this action
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret string that is wiped on drop and never printed.
///
/// Used for webhook secrets and API tokens. `Debug` output only shows the
/// length of the value.
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub struct SecretValue {
    inner: Zeroizing<String>,
}

impl SecretValue {
    /// Wrap a secret string
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: Zeroizing::new(value.into()),
        }
    }

    /// Get the secret as a string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        self.inner.as_str()
    }

    /// Check if secret is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get secret length without exposing content
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl Default for SecretValue {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("length", &self.len())
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Gate configuration model and validation
pub mod config;

/// Custom field identification against the tracker metadata API
pub mod field_resolver;

/// Outbound approve/deny calls to the pipeline-control API
pub mod pipeline_gate;

/// Inbound webhook processing
pub mod webhook;

// Re-export key types for convenience
pub use config::{
    ConfigError, CustomFieldConfig, FieldResolutionConfig, GateConfig, GateSettings,
    PipelineConfig, StateActionMap, TextNormalization,
};
pub use field_resolver::{
    build_field_resolver, CachedFieldResolver, FieldResolutionError, FieldResolver, FieldSource,
    ResolvedField, StaticFieldResolver, TrackerFieldResolver,
};
pub use pipeline_gate::{GateError, PipelineGate, PipelineGateClient};
pub use webhook::{
    ApprovalOutcome, Disposition, IgnoreReason, InboundWebhookRequest, ItemOutcome,
    ProcessingReport, WebhookError, WebhookProcessor, WebhookResponse,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
