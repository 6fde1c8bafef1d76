//! Integration tests for configuration loading and validation

mod common;

use common::*;
use serial_test::serial;
use std::io::Write;
use transition_gate_api::{load_service_config_from, AppState, ServerConfig, ServiceConfig, ServiceError};
use transition_gate_core::Action;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// Verify that ServerConfig defaults are production-ready
#[test]
fn test_server_config_defaults() {
    let config = ServerConfig::default();

    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 3000);
    assert_eq!(config.endpoint_path, "/webhook");
    assert_eq!(config.shutdown_timeout_seconds, 30);
    assert!(config.max_body_size >= 1024 * 1024);
}

/// Verify that an unconfigured gate cannot start
#[test]
fn test_default_config_is_refused_at_startup() {
    let result = AppState::from_config(ServiceConfig::default());

    let error = result.err().unwrap();
    assert!(matches!(error, ServiceError::Configuration(_)));
    assert_eq!(error.exit_code(), 3);
}

/// Verify that a state mapped to both actions is refused at startup
#[test]
fn test_overlapping_states_are_refused() {
    let mut gate = gate_settings("https://pipelines.example.com");
    gate.states.deny.push("Done".to_string());

    let result = AppState::from_config(ServiceConfig {
        gate,
        ..ServiceConfig::default()
    });

    assert!(matches!(result, Err(ServiceError::Configuration(_))));
}

/// Verify that a complete YAML file produces a working application state
#[test]
#[serial]
fn test_yaml_file_builds_application_state() {
    // Arrange
    let file = write_config(
        r#"
server:
  endpoint_path: /hooks/issues
gate:
  webhook:
    secrets: "first, second"
    event_types: [issue_generic_event]
  states:
    approve: [Done, Approved]
    deny: [Rejected]
  custom_field:
    default_id: customfield_10042
  pipeline:
    base_url: pipelines.example.com:8443/ci
    token: cf-api-token
  http:
    timeout_seconds: 5
"#,
    );

    // Act
    let config = load_service_config_from(Some(file.path())).unwrap();
    let gate = config.gate_config().unwrap();
    let state = AppState::from_config(config).unwrap();

    // Assert
    assert_eq!(state.config.server.endpoint_path, "/hooks/issues");
    assert_eq!(gate.webhook_secrets.len(), 2);
    assert_eq!(gate.state_actions.action_for("approved"), Some(Action::Approve));
    assert_eq!(gate.state_actions.action_for("rejected"), Some(Action::Deny));
    assert_eq!(
        gate.pipeline.endpoint.as_str(),
        "https://pipelines.example.com:8443/ci"
    );
}

/// Verify that environment variables complete a partial file
#[test]
#[serial]
fn test_environment_completes_partial_file() {
    // Arrange
    let file = write_config(
        r#"
gate:
  webhook:
    event_types: [issue_generic_event]
  states:
    approve: [Done]
  custom_field:
    default_id: customfield_10042
"#,
    );
    std::env::set_var("TG__GATE__PIPELINE__BASE_URL", "pipelines.example.com");
    std::env::set_var("TG__GATE__PIPELINE__TOKEN", "env-token");

    // Act
    let result = load_service_config_from(Some(file.path()));

    std::env::remove_var("TG__GATE__PIPELINE__BASE_URL");
    std::env::remove_var("TG__GATE__PIPELINE__TOKEN");

    // Assert
    let config = result.unwrap();
    assert_eq!(config.gate.pipeline.token.expose_secret(), "env-token");
    assert!(AppState::from_config(config).is_ok());
}
