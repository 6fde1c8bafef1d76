//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::warn;
use transition_gate_core::WebhookError;

/// Webhook handler errors with HTTP status code mapping
///
/// Only failures that the tracker can act on surface here. Authentication
/// failures and outbound call failures are part of the normal
/// [`Disposition`](transition_gate_core::Disposition) flow and never become
/// handler errors.
///
/// - `400 Bad Request`: the authenticated POST body is not valid JSON
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Webhook processing failure
    ///
    /// Maps to: `400 Bad Request` (permanent error, do not retry)
    #[error("Processing failed: {0}")]
    ProcessingFailed(#[from] WebhookError),
}

impl WebhookHandlerError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ProcessingFailed(WebhookError::MalformedPayload(_)) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        warn!(error = %message, status = status.as_u16(), "Webhook rejected");

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration loading failed: {0}")]
    Loading(#[from] ::config::ConfigError),

    #[error("Gate configuration is invalid: {0}")]
    Gate(#[from] transition_gate_core::ConfigError),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
