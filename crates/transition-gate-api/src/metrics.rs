//! Metrics collection for the API service.

use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use transition_gate_core::{Disposition, ItemOutcome};

/// Service metrics for observability.
///
/// Every instance owns its registry, so several routers can live in one
/// process without colliding registrations.
pub struct GateMetrics {
    registry: Registry,

    // Webhook intake
    pub webhook_requests_total: IntCounterVec,
    pub authentication_failures_total: IntCounter,
    pub malformed_payloads_total: IntCounter,

    // Outbound decisions
    pub gate_calls_total: IntCounterVec,
    pub item_failures_total: IntCounter,
}

impl GateMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some("transition_gate".to_string()), None)?;

        let webhook_requests_total = IntCounterVec::new(
            Opts::new(
                "webhook_requests_total",
                "Webhook deliveries by disposition",
            ),
            &["disposition"],
        )?;
        let authentication_failures_total = IntCounter::new(
            "authentication_failures_total",
            "Deliveries rejected for a missing or unknown webhook secret",
        )?;
        let malformed_payloads_total = IntCounter::new(
            "malformed_payloads_total",
            "Authenticated deliveries with an undecodable body",
        )?;
        let gate_calls_total = IntCounterVec::new(
            Opts::new(
                "gate_calls_total",
                "Pipeline gate calls by action and response status class",
            ),
            &["action", "status_class"],
        )?;
        let item_failures_total = IntCounter::new(
            "item_failures_total",
            "Changelog items whose field lookup or gate call failed",
        )?;

        registry.register(Box::new(webhook_requests_total.clone()))?;
        registry.register(Box::new(authentication_failures_total.clone()))?;
        registry.register(Box::new(malformed_payloads_total.clone()))?;
        registry.register(Box::new(gate_calls_total.clone()))?;
        registry.register(Box::new(item_failures_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            webhook_requests_total,
            authentication_failures_total,
            malformed_payloads_total,
            gate_calls_total,
            item_failures_total,
        }))
    }

    /// Record the outcome of one delivery
    pub fn record_disposition(&self, disposition: &Disposition) {
        self.webhook_requests_total
            .with_label_values(&[disposition.label()])
            .inc();

        match disposition {
            Disposition::Denied => self.authentication_failures_total.inc(),
            Disposition::Ignored(_) => {}
            Disposition::Processed(report) => {
                for item in &report.items {
                    self.record_item(item);
                }
            }
        }
    }

    /// Record a delivery whose body could not be decoded
    pub fn record_malformed_payload(&self) {
        self.webhook_requests_total
            .with_label_values(&["malformed_payload"])
            .inc();
        self.malformed_payloads_total.inc();
    }

    fn record_item(&self, item: &ItemOutcome) {
        match item {
            ItemOutcome::Submitted(outcome) => {
                self.gate_calls_total
                    .with_label_values(&[outcome.action.as_str(), status_class(outcome.status_code)])
                    .inc();
            }
            ItemOutcome::Failed {
                action,
                workflow_id,
                ..
            } => {
                self.item_failures_total.inc();
                // A workflow id means the gate itself was called
                if workflow_id.is_some() {
                    self.gate_calls_total
                        .with_label_values(&[action.as_str(), "error"])
                        .inc();
                }
            }
            ItemOutcome::NoAction { .. } | ItemOutcome::MissingWorkflowId { .. } => {}
        }
    }

    /// Render every metric in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

fn status_class(status_code: u16) -> &'static str {
    match status_code {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
