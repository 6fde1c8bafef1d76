//! Common test utilities for transition-gate integration tests
//!
//! This module provides:
//! - Mock tracker and pipeline-control servers backed by `wiremock`
//! - Helper functions for building service configuration and routers
//! - Shared webhook payload builders

use axum::body::{to_bytes, Body};
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use transition_gate_api::{create_router, AppState, ServiceConfig};
use transition_gate_core::{GateSettings, SecretValue};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Custom field holding the workflow id on test issues
#[allow(dead_code)]
pub const DEFAULT_FIELD_ID: &str = "customfield_10042";

/// Field id the mock tracker reports for the named field
#[allow(dead_code)]
pub const RESOLVED_FIELD_ID: &str = "customfield_10100";

/// Token the pipeline-control API expects verbatim
#[allow(dead_code)]
pub const PIPELINE_TOKEN: &str = "cf-api-token";

// ============================================================================
// Mock servers
// ============================================================================

/// Pipeline-control API that accepts every decision
#[allow(dead_code)]
pub async fn start_pipeline_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/workflow/[^/]+/pending-approval/(approve|deny)$"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Tracker whose field listing contains the "Pipeline Workflow" field
#[allow(dead_code)]
pub async fn start_tracker_api() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/api/3/field"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": "summary", "key": "summary", "name": "Summary" },
            { "id": RESOLVED_FIELD_ID, "key": RESOLVED_FIELD_ID, "name": "Pipeline Workflow" }
        ])))
        .mount(&server)
        .await;
    server
}

/// Paths of the requests a mock server received, in arrival order
#[allow(dead_code)]
pub async fn received_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect()
}

// ============================================================================
// Configuration and application
// ============================================================================

/// Gate settings pointing at the given pipeline-control API
#[allow(dead_code)]
pub fn gate_settings(pipeline_uri: &str) -> GateSettings {
    let mut settings = GateSettings::default();
    settings.webhook.event_types = vec!["issue_generic_event".to_string()];
    settings.states.approve = vec!["done".to_string(), "approved".to_string()];
    settings.states.deny = vec!["rejected".to_string()];
    settings.custom_field.name = "Pipeline Workflow".to_string();
    settings.custom_field.default_id = DEFAULT_FIELD_ID.to_string();
    settings.pipeline.base_url = pipeline_uri.to_string();
    settings.pipeline.token = SecretValue::new(PIPELINE_TOKEN);
    settings.http.timeout_seconds = 2;
    settings
}

/// Enable field resolution against the given tracker
#[allow(dead_code)]
pub fn with_field_resolution(mut settings: GateSettings, tracker_uri: &str) -> GateSettings {
    settings.field_resolution.enabled = true;
    settings.field_resolution.base_url = tracker_uri.to_string();
    settings.field_resolution.username = "gate-bot".to_string();
    settings.field_resolution.token = SecretValue::new("tracker-token");
    settings
}

/// Require the given webhook secrets
#[allow(dead_code)]
pub fn with_secrets(mut settings: GateSettings, secrets: &[&str]) -> GateSettings {
    settings.webhook.secrets = secrets.iter().map(|s| SecretValue::new(*s)).collect();
    settings
}

/// Router wired exactly as the service wires it
#[allow(dead_code)]
pub fn create_test_app(gate: GateSettings) -> Router {
    let config = ServiceConfig {
        gate,
        ..ServiceConfig::default()
    };
    let state = AppState::from_config(config).expect("test configuration is valid");
    create_router(state)
}

// ============================================================================
// Payloads and requests
// ============================================================================

/// Changelog item moving the issue status to `to_state`
#[allow(dead_code)]
pub fn status_change(to_state: &str) -> serde_json::Value {
    serde_json::json!({
        "field": "status",
        "fieldtype": "jira",
        "from": "3",
        "fromString": "In Progress",
        "to": "10001",
        "toString": to_state
    })
}

/// Issue-updated payload with the workflow id stored under `field_id`
#[allow(dead_code)]
pub fn issue_payload(
    event_type: &str,
    items: Vec<serde_json::Value>,
    field_id: &str,
    workflow_id: &str,
) -> Vec<u8> {
    let mut fields = serde_json::Map::new();
    fields.insert(field_id.to_string(), serde_json::json!(workflow_id));
    fields.insert("summary".to_string(), serde_json::json!("Release train"));

    serde_json::to_vec(&serde_json::json!({
        "timestamp": 1700000000000u64,
        "webhookEvent": "jira:issue_updated",
        "issue_event_type_name": event_type,
        "issue": { "id": "10001", "key": "OPS-7", "fields": fields },
        "changelog": { "id": "20001", "items": items }
    }))
    .expect("payload serializes")
}

/// POST a delivery to the webhook endpoint
#[allow(dead_code)]
pub fn post_webhook(query: &str, body: Vec<u8>) -> Request<Body> {
    let uri = if query.is_empty() {
        "/webhook".to_string()
    } else {
        format!("/webhook?{}", query)
    };

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .expect("request builds")
}

/// Read a response body as text
#[allow(dead_code)]
pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("body is UTF-8")
}
