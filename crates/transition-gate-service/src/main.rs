//! # Transition Gate Service
//!
//! Binary entry point for the transition gate HTTP service.
//!
//! This executable:
//! - Loads configuration from files and `TG__` environment variables
//! - Initializes logging
//! - Starts the HTTP server from transition-gate-api
//!
//! Exit codes: `1` bind failure, `2` server failure, `3` configuration error.

use transition_gate_api::{load_service_config, start_server, LoggingConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match load_service_config() {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default())?;
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(3);
        }
    };

    init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting transition gate service"
    );

    if let Err(e) = start_server(config).await {
        error!(error = %e, "Service stopped with an error");
        std::process::exit(e.exit_code());
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&logging.level)))?;

    let json_layer = logging
        .json_format
        .then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!logging.json_format).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    Ok(())
}

fn default_directives(level: &str) -> String {
    format!(
        "transition_gate={level},transition_gate_api={level},transition_gate_core={level},tower_http={level}",
        level = level
    )
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
