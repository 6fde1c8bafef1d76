//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use transition_gate_core::{GateConfig, GateSettings};

/// Environment variable naming an additional configuration file
pub const CONFIG_FILE_ENV: &str = "TG_CONFIG_FILE";

/// Prefix of configuration environment variables, e.g. `TG__SERVER__PORT`
pub const ENV_PREFIX: &str = "TG";

/// Paths reserved for the service's own endpoints
const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

/// Service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Webhook gate settings, validated by [`ServiceConfig::gate_config`]
    pub gate: GateSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Path the tracker delivers webhooks to
    pub endpoint_path: String,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            endpoint_path: "/webhook".to_string(),
            shutdown_timeout_seconds: 30,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ServiceConfig {
    /// Validate the server and logging sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        let path = &self.server.endpoint_path;
        if !path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!("server.endpoint_path '{}' must start with '/'", path),
            });
        }

        if RESERVED_PATHS.contains(&path.as_str()) {
            return Err(ConfigError::Invalid {
                message: format!("server.endpoint_path '{}' is reserved", path),
            });
        }

        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid {
                message: "server.max_body_size must be greater than zero".to_string(),
            });
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "logging.level must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Validate the gate section and build the immutable gate configuration
    pub fn gate_config(&self) -> Result<GateConfig, ConfigError> {
        Ok(GateConfig::from_settings(self.gate.clone())?)
    }
}

/// Load the service configuration.
///
/// Sources are applied in order, later sources overriding earlier ones:
///
/// 1. `/etc/transition-gate/service.yaml`
/// 2. `config/service.yaml`
/// 3. the file named by `TG_CONFIG_FILE`, which must exist when set
/// 4. environment variables prefixed `TG__` with `__` between keys, e.g.
///    `TG__GATE__PIPELINE__TOKEN`. List settings accept comma-separated
///    values.
pub fn load_service_config() -> Result<ServiceConfig, ConfigError> {
    let explicit_path = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty());

    load_service_config_from(explicit_path.as_deref().map(Path::new))
}

/// Load the service configuration with an optional explicit file
pub fn load_service_config_from(explicit_path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut builder = ::config::Config::builder()
        .add_source(
            ::config::File::with_name("/etc/transition-gate/service")
                .required(false)
                .format(::config::FileFormat::Yaml),
        )
        .add_source(
            ::config::File::with_name("config/service")
                .required(false)
                .format(::config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        info!(path = %path.display(), "Loading configuration from explicit path");
        builder = builder.add_source(
            ::config::File::from(path)
                .required(true)
                .format(::config::FileFormat::Yaml),
        );
    }

    let service_config: ServiceConfig = builder
        .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;

    service_config.validate()?;
    Ok(service_config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
