//! Tests for the HTTP layer.

use super::*;
use async_trait::async_trait;
use axum::body::to_bytes;
use std::sync::Mutex;
use tower::ServiceExt;
use transition_gate_core::{
    Action, GateConfig, GateError, GateSettings, PipelineGate, SecretValue, StaticFieldResolver,
};

// ============================================================================
// Mock PipelineGate
// ============================================================================

/// Test double that records every decision and answers 200.
#[derive(Clone, Default)]
struct RecordingGate {
    calls: Arc<Mutex<Vec<(Action, String)>>>,
}

impl RecordingGate {
    fn calls(&self) -> Vec<(Action, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PipelineGate for RecordingGate {
    async fn invoke(&self, action: Action, workflow_id: &str) -> Result<u16, GateError> {
        self.calls
            .lock()
            .unwrap()
            .push((action, workflow_id.to_string()));
        Ok(200)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn gate_settings() -> GateSettings {
    let mut settings = GateSettings::default();
    settings.webhook.secrets = vec![SecretValue::new("s3cr3t")];
    settings.webhook.event_types = vec!["issue_generic_event".to_string()];
    settings.states.approve = vec!["done".to_string()];
    settings.custom_field.default_id = "customfield_10042".to_string();
    settings.pipeline.base_url = "https://pipeline.test".to_string();
    settings.pipeline.token = SecretValue::new("cf-api-token");
    settings
}

fn test_app(max_body_size: usize) -> (Router, RecordingGate, Arc<GateMetrics>) {
    let mut config = ServiceConfig::default();
    config.server.max_body_size = max_body_size;
    config.gate = gate_settings();

    let gate_config = Arc::new(GateConfig::from_settings(config.gate.clone()).unwrap());
    let gate = RecordingGate::default();
    let processor = WebhookProcessor::new(
        gate_config,
        Arc::new(StaticFieldResolver::new("customfield_10042")),
        Arc::new(gate.clone()),
    );
    let metrics = GateMetrics::new().unwrap();

    let state = AppState::new(config, Arc::new(processor), metrics.clone());
    (create_router(state), gate, metrics)
}

fn done_payload() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "issue_event_type_name": "issue_generic_event",
        "changelog": { "items": [ { "field": "status", "toString": "Done" } ] },
        "issue": { "fields": { "customfield_10042": "wf-123" } }
    }))
    .unwrap()
}

fn webhook_request(method: &str, uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Webhook endpoint
// ============================================================================

mod webhook_tests {
    use super::*;

    /// Verify that an authenticated transition is acknowledged and submitted.
    #[tokio::test]
    async fn test_authenticated_delivery_is_processed() {
        let (app, gate, metrics) = test_app(1024 * 1024);

        let response = app
            .oneshot(webhook_request(
                "POST",
                "/webhook?webhook_secret=s3cr3t&issue_key=OPS-7",
                done_payload(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "\"Webhook received!\"");
        assert_eq!(gate.calls(), vec![(Action::Approve, "wf-123".to_string())]);
        assert_eq!(
            metrics
                .gate_calls_total
                .with_label_values(&["approve", "2xx"])
                .get(),
            1
        );
    }

    /// Verify that a missing secret is rejected without outbound calls.
    #[tokio::test]
    async fn test_missing_secret_is_denied() {
        let (app, gate, metrics) = test_app(1024 * 1024);

        let response = app
            .oneshot(webhook_request("POST", "/webhook", done_payload()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "\"access denied\"");
        assert!(gate.calls().is_empty());
        assert_eq!(metrics.authentication_failures_total.get(), 1);
    }

    /// Verify that non-POST deliveries are acknowledged without processing.
    #[tokio::test]
    async fn test_get_is_acknowledged() {
        let (app, gate, _metrics) = test_app(1024 * 1024);

        let response = app
            .oneshot(webhook_request(
                "GET",
                "/webhook?webhook_secret=s3cr3t",
                Vec::new(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "\"Webhook received!\"");
        assert!(gate.calls().is_empty());
    }

    /// Verify that an undecodable body maps to 400 with a JSON error.
    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (app, _gate, metrics) = test_app(1024 * 1024);

        let response = app
            .oneshot(webhook_request(
                "POST",
                "/webhook?webhook_secret=s3cr3t",
                b"{not json".to_vec(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], 400);
        assert_eq!(metrics.malformed_payloads_total.get(), 1);
    }

    /// Verify that bodies above the configured limit are refused.
    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (app, gate, _metrics) = test_app(64);

        let response = app
            .oneshot(webhook_request(
                "POST",
                "/webhook?webhook_secret=s3cr3t",
                done_payload(),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(gate.calls().is_empty());
    }
}

// ============================================================================
// Service endpoints and middleware
// ============================================================================

mod service_endpoint_tests {
    use super::*;

    /// Verify that the health endpoint reports the crate version.
    #[tokio::test]
    async fn test_health_check() {
        let (app, _gate, _metrics) = test_app(1024 * 1024);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    /// Verify that metrics are exposed in the Prometheus text format.
    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _gate, metrics) = test_app(1024 * 1024);
        metrics.record_malformed_payload();

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response)
            .await
            .contains("transition_gate_malformed_payloads_total 1"));
    }

    /// Verify that a caller-supplied correlation ID is echoed back.
    #[tokio::test]
    async fn test_correlation_id_is_propagated() {
        let (app, _gate, _metrics) = test_app(1024 * 1024);

        let response = app
            .oneshot(
                Request::get("/health")
                    .header(CORRELATION_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(CORRELATION_ID_HEADER).unwrap(),
            "req-42"
        );
    }

    /// Verify that a correlation ID is generated when none is supplied.
    #[tokio::test]
    async fn test_correlation_id_is_generated() {
        let (app, _gate, _metrics) = test_app(1024 * 1024);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let correlation_id = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(uuid::Uuid::parse_str(correlation_id).is_ok());
    }

    /// Verify that unknown paths are not routed to the webhook handler.
    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (app, gate, _metrics) = test_app(1024 * 1024);

        let response = app
            .oneshot(webhook_request("POST", "/other", done_payload()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(gate.calls().is_empty());
    }
}
