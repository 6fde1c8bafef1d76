//! Results of processing one webhook delivery.
//!
//! - [`ItemOutcome`]: what happened to a single changelog item.
//! - [`ProcessingReport`]: the ordered outcomes of every item in a delivery.
//! - [`Disposition`]: how the delivery as a whole was handled, which decides
//!   the [`WebhookResponse`] returned to the tracker.
//!
//! The response is decoupled from the outcomes: the tracker sees `200` for
//! every authenticated delivery, whether or not any pipeline decision was
//! submitted or succeeded.

use crate::Action;
use serde::Serialize;

// ============================================================================
// Item outcomes
// ============================================================================

/// Decision submitted for one changelog item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub action: Action,
    pub workflow_id: String,

    /// Status code returned by the pipeline-control API, whatever its class
    pub status_code: u16,
}

/// Outcome of one changelog item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The new state maps to neither approve nor deny
    NoAction { to_state: Option<String> },

    /// The issue carries no usable workflow id in the resolved field
    MissingWorkflowId { action: Action, field_id: String },

    /// The decision reached the pipeline-control API
    Submitted(ApprovalOutcome),

    /// Field resolution or the gate call failed at transport level
    Failed {
        action: Action,
        workflow_id: Option<String>,
        error: String,
    },
}

impl ItemOutcome {
    /// Action resolved for the item, if any
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::NoAction { .. } => None,
            Self::MissingWorkflowId { action, .. } => Some(*action),
            Self::Submitted(outcome) => Some(outcome.action),
            Self::Failed { action, .. } => Some(*action),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Ordered outcomes of every changelog item in a delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingReport {
    pub items: Vec<ItemOutcome>,
}

impl ProcessingReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: ItemOutcome) {
        self.items.push(outcome);
    }

    /// Decisions that reached the pipeline-control API, in order
    pub fn submitted(&self) -> impl Iterator<Item = &ApprovalOutcome> {
        self.items.iter().filter_map(|item| match item {
            ItemOutcome::Submitted(outcome) => Some(outcome),
            _ => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_failure()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.items.iter().any(ItemOutcome::is_failure)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ============================================================================
// Delivery disposition
// ============================================================================

/// Why an authenticated delivery was acknowledged without processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Only POST deliveries are processed
    MethodNotProcessed,

    /// The event type is not in the configured allowlist
    EventTypeNotAllowed,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MethodNotProcessed => "method_not_processed",
            Self::EventTypeNotAllowed => "event_type_not_allowed",
        }
    }
}

/// How a delivery was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Authentication failed; nothing was processed
    Denied,

    /// Authenticated but deliberately not processed
    Ignored(IgnoreReason),

    /// Changelog processed; see the report for per-item outcomes
    Processed(ProcessingReport),
}

impl Disposition {
    /// Response returned to the tracker
    pub fn response(&self) -> WebhookResponse {
        match self {
            Self::Denied => WebhookResponse::access_denied(),
            Self::Ignored(_) | Self::Processed(_) => WebhookResponse::received(),
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Denied => "denied",
            Self::Ignored(reason) => reason.as_str(),
            Self::Processed(_) => "processed",
        }
    }
}

/// Status code and body returned to the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookResponse {
    pub status_code: u16,
    pub body: String,
}

impl WebhookResponse {
    pub const RECEIVED: &'static str = "Webhook received!";
    pub const ACCESS_DENIED: &'static str = "access denied";

    /// Acknowledgement for every authenticated delivery
    pub fn received() -> Self {
        Self {
            status_code: 200,
            body: Self::RECEIVED.to_string(),
        }
    }

    /// Rejection of a delivery without a valid webhook secret
    pub fn access_denied() -> Self {
        Self {
            status_code: 500,
            body: Self::ACCESS_DENIED.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[cfg(test)]
#[path = "processing_output_tests.rs"]
mod tests;
