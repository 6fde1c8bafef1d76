//! # Transition Gate HTTP Service
//!
//! HTTP server receiving issue-transition webhooks and handing them to the
//! [`WebhookProcessor`].
//!
//! This service provides:
//! - the webhook endpoint (any method; only POST deliveries are processed)
//! - a health check endpoint
//! - a Prometheus metrics endpoint

pub mod config;
pub mod errors;
pub mod metrics;
pub mod responses;

pub use crate::config::{
    load_service_config, load_service_config_from, LoggingConfig, ServerConfig, ServiceConfig,
};
pub use crate::errors::{ConfigError, ServiceError, WebhookHandlerError};
pub use crate::metrics::GateMetrics;
pub use crate::responses::HealthResponse;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Query, State},
    http::{Method, Request, StatusCode},
    middleware,
    response::{Json, Response},
    routing::{any, get},
    Router,
};
use bytes::Bytes;
use std::{collections::HashMap, future::IntoFuture, sync::Arc, time::Duration};
use tokio::sync::Notify;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use transition_gate_core::{InboundWebhookRequest, WebhookProcessor};

/// Header carrying the request correlation id
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Processor handling webhook deliveries
    pub processor: Arc<WebhookProcessor>,

    /// Metrics collector for observability
    pub metrics: Arc<GateMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        processor: Arc<WebhookProcessor>,
        metrics: Arc<GateMetrics>,
    ) -> Self {
        Self {
            config,
            processor,
            metrics,
        }
    }

    /// Build the processor and metrics described by the configuration
    pub fn from_config(config: ServiceConfig) -> Result<Self, ServiceError> {
        let gate_config = Arc::new(config.gate_config()?);

        info!(
            event_types = gate_config.event_types.len(),
            states = gate_config.state_actions.len(),
            authentication = gate_config.requires_authentication(),
            field_resolution = gate_config.field_resolution.is_some(),
            pipeline = %gate_config.pipeline.endpoint,
            "Gate configuration loaded"
        );

        let processor = WebhookProcessor::from_config(gate_config).map_err(ConfigError::from)?;

        let metrics = GateMetrics::new().map_err(|e| ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })?;

        Ok(Self::new(config, Arc::new(processor), metrics))
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes =
        Router::new().route(&state.config.server.endpoint_path, any(handle_webhook));

    let health_routes = Router::new().route("/health", get(handle_health_check));

    let observability_routes = Router::new().route("/metrics", get(metrics_endpoint));

    Router::new()
        .merge(webhook_routes)
        .merge(health_routes)
        .merge(observability_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    // The query string carries the webhook secret
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }))
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server and run until a shutdown signal arrives
pub async fn start_server(config: ServiceConfig) -> Result<(), ServiceError> {
    let state = AppState::from_config(config.clone())?;
    let app = create_router(state);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(
        address = %address,
        endpoint = %config.server.endpoint_path,
        "Starting HTTP server"
    );

    let shutdown = Arc::new(Notify::new());
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.notified().await }
        })
        .into_future();
    tokio::pin!(server);

    // In-flight requests may finish within the shutdown timeout; the server
    // stops accepting connections as soon as the signal arrives.
    let result = tokio::select! {
        result = &mut server => result,
        _ = shutdown_signal() => {
            info!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Initiating graceful shutdown"
            );
            shutdown.notify_one();

            match tokio::time::timeout(shutdown_timeout, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Graceful shutdown timed out; abandoning in-flight requests");
                    Ok(())
                }
            }
        }
    };

    result.map_err(|e| ServiceError::ServerFailed {
        message: e.to_string(),
    })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Handle tracker webhook deliveries
///
/// The response body is a JSON string: `"Webhook received!"` with `200` for
/// every authenticated delivery, `"access denied"` with `500` when the
/// webhook secret is missing or unknown. Outbound failures never change the
/// response.
#[instrument(skip_all, fields(method = %method))]
pub async fn handle_webhook(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Result<(StatusCode, Json<String>), WebhookHandlerError> {
    let request = InboundWebhookRequest::new(method.as_str(), query, body);

    let disposition = match state.processor.handle(request).await {
        Ok(disposition) => disposition,
        Err(e) => {
            state.metrics.record_malformed_payload();
            return Err(e.into());
        }
    };

    state.metrics.record_disposition(&disposition);

    let response = disposition.response();
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    info!(
        disposition = disposition.label(),
        status = status.as_u16(),
        "Webhook handled"
    );

    Ok((status, Json(response.body)))
}

// ============================================================================
// Health Check Handlers
// ============================================================================

/// Basic health check endpoint
async fn handle_health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.encode().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Uses the caller's `x-correlation-id` or generates one, records it on the
/// request span and echoes it in the response headers.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri().path(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());

    request.extensions_mut().insert(correlation_id.clone());

    // The query string carries the webhook secret, so only the path is logged
    info!(
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
        "Request started"
    );

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed successfully"
        );
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
