//! Gate configuration model.
//!
//! Configuration arrives in two shapes:
//!
//! - [`GateSettings`]: the raw serde shape read from configuration files and
//!   environment variables. Every field has a default so partially configured
//!   sources still deserialize.
//! - [`GateConfig`]: the validated, normalised model built once at start-up
//!   by [`GateConfig::from_settings`]. It is shared read-only (behind an
//!   `Arc`) by every component for the lifetime of the process.
//!
//! Validation is eager: a state that appears in both the approve and the deny
//! list, a missing pipeline endpoint or token, or field resolution enabled
//! without tracker credentials all fail start-up instead of surfacing while
//! a webhook is being handled.

use crate::{Action, SecretValue};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Default bound on every outbound HTTP call
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

// ============================================================================
// Errors
// ============================================================================

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Invalid configuration for '{key}': {message}")]
    Invalid { key: String, message: String },

    #[error("State '{state}' is configured as both an approve and a deny state")]
    ConflictingState { state: String },
}

// ============================================================================
// Text normalization
// ============================================================================

/// Policy applied to state names, event types and field names before they
/// are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextNormalization {
    /// Strip leading and trailing whitespace
    pub trim: bool,

    /// Compare case-sensitively; when false values are lowercased
    pub case_sensitive: bool,
}

impl Default for TextNormalization {
    fn default() -> Self {
        Self {
            trim: true,
            case_sensitive: false,
        }
    }
}

impl TextNormalization {
    /// Normalization that leaves values untouched
    pub fn exact() -> Self {
        Self {
            trim: false,
            case_sensitive: true,
        }
    }

    /// Apply the policy. Applying it twice yields the same result as once.
    pub fn normalize(&self, value: &str) -> String {
        let value = if self.trim { value.trim() } else { value };

        if self.case_sensitive {
            value.to_string()
        } else {
            value.to_lowercase()
        }
    }
}

// ============================================================================
// Raw settings
// ============================================================================

/// Raw gate settings as read from configuration sources
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Inbound webhook settings
    pub webhook: WebhookSettings,

    /// Issue states that trigger a decision
    pub states: StateSettings,

    /// Comparison policy for states, event types and field names
    pub normalization: TextNormalization,

    /// Custom field that carries the workflow id
    pub custom_field: CustomFieldSettings,

    /// Optional lookup of the custom field id by name
    pub field_resolution: FieldResolutionSettings,

    /// Pipeline-control API
    pub pipeline: PipelineSettings,

    /// Outbound HTTP behaviour
    pub http: HttpSettings,
}

/// Inbound webhook settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    /// Accepted values of the `webhook_secret` query parameter (empty = no auth)
    #[serde(deserialize_with = "deserialize_secret_list")]
    pub secrets: Vec<SecretValue>,

    /// Tracker event types that are processed, e.g. `issue_generic_event`
    #[serde(deserialize_with = "deserialize_list")]
    pub event_types: Vec<String>,
}

/// Approve and deny state lists
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    #[serde(deserialize_with = "deserialize_list")]
    pub approve: Vec<String>,

    #[serde(deserialize_with = "deserialize_list")]
    pub deny: Vec<String>,
}

/// Custom field settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CustomFieldSettings {
    /// Display name of the field, used when resolving by name
    pub name: String,

    /// Field id used when resolution is disabled or finds no match
    pub default_id: String,
}

/// Tracker field metadata API settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FieldResolutionSettings {
    pub enabled: bool,
    pub base_url: String,
    pub port: Option<u16>,
    pub username: String,
    pub token: SecretValue,

    /// Cache lifetime for a resolved field id; 0 disables caching
    pub cache_ttl_seconds: u64,
}

/// Pipeline-control API settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Base URL; a bare host is taken as `https://<host>`
    pub base_url: String,
    pub port: Option<u16>,

    /// Sent verbatim in the `Authorization` header
    pub token: SecretValue,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Timeout applied to every outbound call
    pub timeout_seconds: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// Lists may be given as a sequence or as one comma-separated string, which
/// is what environment variables provide.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListOrCsv {
    List(Vec<String>),
    Csv(String),
}

impl ListOrCsv {
    fn into_items(self) -> Vec<String> {
        let items = match self {
            Self::List(items) => items,
            Self::Csv(value) => value.split(',').map(str::to_string).collect(),
        };

        items
            .into_iter()
            .filter(|item| !item.trim().is_empty())
            .collect()
    }
}

fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(ListOrCsv::deserialize(deserializer)?.into_items())
}

fn deserialize_secret_list<'de, D>(deserializer: D) -> Result<Vec<SecretValue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(ListOrCsv::deserialize(deserializer)?
        .into_items()
        .into_iter()
        .map(|item| SecretValue::new(item.trim()))
        .collect())
}

// ============================================================================
// State to action mapping
// ============================================================================

/// Mapping from normalised issue state to the action it triggers
#[derive(Debug, Clone, Default)]
pub struct StateActionMap {
    actions: HashMap<String, Action>,
}

impl StateActionMap {
    /// Build the map, rejecting any state that normalises into both lists.
    pub fn new(
        approve: &[String],
        deny: &[String],
        normalization: &TextNormalization,
    ) -> Result<Self, ConfigError> {
        let mut actions = HashMap::new();

        for (states, action) in [(approve, Action::Approve), (deny, Action::Deny)] {
            for state in states {
                let key = normalization.normalize(state);
                if key.is_empty() {
                    continue;
                }

                match actions.insert(key.clone(), action) {
                    Some(existing) if existing != action => {
                        return Err(ConfigError::ConflictingState { state: key });
                    }
                    _ => {}
                }
            }
        }

        Ok(Self { actions })
    }

    /// Look up the action for an already normalised state
    pub fn action_for(&self, normalized_state: &str) -> Option<Action> {
        self.actions.get(normalized_state).copied()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

// ============================================================================
// Validated configuration
// ============================================================================

/// Custom field that carries the workflow id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFieldConfig {
    pub name: String,
    pub default_id: String,
}

/// Tracker field metadata API access, present only when resolution is enabled
#[derive(Debug, Clone)]
pub struct FieldResolutionConfig {
    pub endpoint: Url,
    pub username: String,
    pub token: SecretValue,
    pub cache_ttl: Option<Duration>,
}

/// Pipeline-control API access
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub endpoint: Url,
    pub token: SecretValue,
}

/// Validated gate configuration
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Accepted webhook secrets; empty disables authentication
    pub webhook_secrets: Vec<SecretValue>,

    /// Normalised event types that are processed
    pub event_types: HashSet<String>,

    pub state_actions: StateActionMap,
    pub normalization: TextNormalization,
    pub custom_field: CustomFieldConfig,
    pub field_resolution: Option<FieldResolutionConfig>,
    pub pipeline: PipelineConfig,

    /// Bound on every outbound call
    pub request_timeout: Duration,
}

impl GateConfig {
    /// Validate raw settings and build the immutable configuration
    pub fn from_settings(settings: GateSettings) -> Result<Self, ConfigError> {
        let normalization = settings.normalization;

        let webhook_secrets: Vec<SecretValue> = settings
            .webhook
            .secrets
            .into_iter()
            .filter(|secret| !secret.is_empty())
            .collect();
        if webhook_secrets.is_empty() {
            warn!("No webhook secrets configured; inbound webhook authentication is disabled");
        }

        let event_types: HashSet<String> = settings
            .webhook
            .event_types
            .iter()
            .map(|event_type| normalization.normalize(event_type))
            .filter(|event_type| !event_type.is_empty())
            .collect();
        if event_types.is_empty() {
            return Err(ConfigError::Missing {
                key: "webhook.event_types".to_string(),
            });
        }

        let state_actions = StateActionMap::new(
            &settings.states.approve,
            &settings.states.deny,
            &normalization,
        )?;
        if state_actions.is_empty() {
            return Err(ConfigError::Missing {
                key: "states.approve or states.deny".to_string(),
            });
        }

        let default_id = settings.custom_field.default_id.trim().to_string();
        if default_id.is_empty() {
            return Err(ConfigError::Missing {
                key: "custom_field.default_id".to_string(),
            });
        }

        let field_resolution = if settings.field_resolution.enabled {
            Some(Self::field_resolution_from(
                settings.field_resolution,
                &settings.custom_field.name,
            )?)
        } else {
            None
        };

        let pipeline = PipelineConfig {
            endpoint: parse_endpoint(
                "pipeline.base_url",
                &settings.pipeline.base_url,
                settings.pipeline.port,
            )?,
            token: require_secret("pipeline.token", settings.pipeline.token)?,
        };

        if settings.http.timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "http.timeout_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            webhook_secrets,
            event_types,
            state_actions,
            normalization,
            custom_field: CustomFieldConfig {
                name: settings.custom_field.name,
                default_id,
            },
            field_resolution,
            pipeline,
            request_timeout: Duration::from_secs(settings.http.timeout_seconds),
        })
    }

    fn field_resolution_from(
        settings: FieldResolutionSettings,
        field_name: &str,
    ) -> Result<FieldResolutionConfig, ConfigError> {
        if field_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "custom_field.name".to_string(),
            });
        }

        if settings.username.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "field_resolution.username".to_string(),
            });
        }

        Ok(FieldResolutionConfig {
            endpoint: parse_endpoint(
                "field_resolution.base_url",
                &settings.base_url,
                settings.port,
            )?,
            username: settings.username,
            token: require_secret("field_resolution.token", settings.token)?,
            cache_ttl: (settings.cache_ttl_seconds > 0)
                .then(|| Duration::from_secs(settings.cache_ttl_seconds)),
        })
    }

    /// Whether inbound requests must carry a webhook secret
    pub fn requires_authentication(&self) -> bool {
        !self.webhook_secrets.is_empty()
    }
}

fn require_secret(key: &str, secret: SecretValue) -> Result<SecretValue, ConfigError> {
    if secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Missing {
            key: key.to_string(),
        });
    }
    Ok(secret)
}

/// Build an endpoint URL from a base URL and an optional port override.
fn parse_endpoint(key: &str, base_url: &str, port: Option<u16>) -> Result<Url, ConfigError> {
    let base_url = base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::Missing {
            key: key.to_string(),
        });
    }

    let with_scheme = if base_url.contains("://") {
        base_url.to_string()
    } else {
        format!("https://{}", base_url)
    };

    let mut url = Url::parse(&with_scheme).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        message: e.to_string(),
    })?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            message: "must be an absolute http(s) URL".to_string(),
        });
    }

    if let Some(port) = port {
        url.set_port(Some(port)).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            message: format!("cannot apply port {}", port),
        })?;
    }

    Ok(url)
}

/// Append path segments to an endpoint validated by [`parse_endpoint`].
pub(crate) fn endpoint_url(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
