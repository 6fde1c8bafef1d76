//! Custom field identification.
//!
//! The workflow id lives in a tracker custom field. Its id is either taken
//! from configuration ([`StaticFieldResolver`]) or looked up by display name
//! through the tracker's field metadata API ([`TrackerFieldResolver`]), which
//! lets the field be renamed or recreated on the tracker side without
//! reconfiguring the gate.
//!
//! A lookup that finds no field with the configured name falls back to the
//! configured default id. That is a valid outcome, not an error; only a
//! failed metadata request is reported as [`FieldResolutionError`].

use crate::config::{
    endpoint_url, CustomFieldConfig, FieldResolutionConfig, GateConfig, TextNormalization,
};
use crate::SecretValue;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;

// ============================================================================
// Core Types
// ============================================================================

/// Where a resolved field id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Resolution disabled; configured default used
    Configured,

    /// A tracker field matched the configured name
    Matched,

    /// No tracker field matched; configured default used
    Fallback,
}

/// Field id used to read the workflow id from `issue.fields`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedField {
    pub id: String,
    pub source: FieldSource,
}

impl ResolvedField {
    pub fn new(id: impl Into<String>, source: FieldSource) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// Entry of the tracker field listing
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerField {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

/// Field metadata lookup failures
#[derive(Debug, thiserror::Error)]
pub enum FieldResolutionError {
    #[error("Field metadata request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Field metadata request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("Field metadata request to {endpoint} returned status {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Field metadata response from {endpoint} could not be decoded: {message}")]
    InvalidResponse { endpoint: String, message: String },
}

/// Interface for finding the custom field id
#[async_trait]
pub trait FieldResolver: Send + Sync {
    async fn resolve(&self) -> Result<ResolvedField, FieldResolutionError>;
}

/// Build the resolver described by the configuration.
///
/// Resolution disabled yields a [`StaticFieldResolver`]. Otherwise a
/// [`TrackerFieldResolver`] is created, wrapped in a [`CachedFieldResolver`]
/// when a cache TTL is configured.
pub fn build_field_resolver(
    config: &GateConfig,
    http_client: reqwest::Client,
) -> Arc<dyn FieldResolver> {
    let Some(resolution) = &config.field_resolution else {
        return Arc::new(StaticFieldResolver::new(
            config.custom_field.default_id.clone(),
        ));
    };

    let tracker: Arc<dyn FieldResolver> = Arc::new(TrackerFieldResolver::new(
        http_client,
        resolution,
        &config.custom_field,
        config.normalization,
    ));

    match resolution.cache_ttl {
        Some(ttl) => Arc::new(CachedFieldResolver::new(tracker, ttl)),
        None => tracker,
    }
}

// ============================================================================
// StaticFieldResolver
// ============================================================================

/// Returns the configured field id without any lookup
#[derive(Debug, Clone)]
pub struct StaticFieldResolver {
    field_id: String,
}

impl StaticFieldResolver {
    pub fn new(field_id: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
        }
    }
}

#[async_trait]
impl FieldResolver for StaticFieldResolver {
    async fn resolve(&self) -> Result<ResolvedField, FieldResolutionError> {
        Ok(ResolvedField::new(
            self.field_id.clone(),
            FieldSource::Configured,
        ))
    }
}

// ============================================================================
// TrackerFieldResolver
// ============================================================================

/// Resolves the field id by name through the tracker field metadata API.
///
/// Issues `GET {base}/rest/api/3/field` with basic authentication and scans
/// the returned list for the first field whose normalised name equals the
/// normalised configured name.
pub struct TrackerFieldResolver {
    http_client: reqwest::Client,
    fields_url: Url,
    username: String,
    token: SecretValue,
    field_name: String,
    default_id: String,
    normalization: TextNormalization,
}

impl TrackerFieldResolver {
    /// Path of the field listing below the tracker base URL
    pub const FIELDS_PATH: [&'static str; 4] = ["rest", "api", "3", "field"];

    pub fn new(
        http_client: reqwest::Client,
        resolution: &FieldResolutionConfig,
        custom_field: &CustomFieldConfig,
        normalization: TextNormalization,
    ) -> Self {
        Self {
            http_client,
            fields_url: endpoint_url(&resolution.endpoint, &Self::FIELDS_PATH),
            username: resolution.username.clone(),
            token: resolution.token.clone(),
            field_name: custom_field.name.clone(),
            default_id: custom_field.default_id.clone(),
            normalization,
        }
    }

    /// Pick the field id from a tracker field listing
    pub fn select(&self, fields: &[TrackerField]) -> ResolvedField {
        let wanted = self.normalization.normalize(&self.field_name);

        let matched = fields.iter().find(|field| {
            field
                .name
                .as_deref()
                .is_some_and(|name| self.normalization.normalize(name) == wanted)
        });

        match matched.and_then(|field| field.key.clone().or_else(|| field.id.clone())) {
            Some(id) => ResolvedField::new(id, FieldSource::Matched),
            None => ResolvedField::new(self.default_id.clone(), FieldSource::Fallback),
        }
    }

    async fn fetch_fields(&self) -> Result<Vec<TrackerField>, FieldResolutionError> {
        let endpoint = self.fields_url.to_string();

        let response = self
            .http_client
            .get(self.fields_url.clone())
            .basic_auth(&self.username, Some(self.token.expose_secret()))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FieldResolutionError::Timeout {
                        endpoint: endpoint.clone(),
                    }
                } else {
                    FieldResolutionError::Transport {
                        endpoint: endpoint.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FieldResolutionError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json::<Vec<TrackerField>>()
            .await
            .map_err(|e| FieldResolutionError::InvalidResponse {
                endpoint,
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for TrackerFieldResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerFieldResolver")
            .field("fields_url", &self.fields_url.as_str())
            .field("username", &self.username)
            .field("field_name", &self.field_name)
            .field("default_id", &self.default_id)
            .finish()
    }
}

#[async_trait]
impl FieldResolver for TrackerFieldResolver {
    #[instrument(skip(self), fields(field_name = %self.field_name))]
    async fn resolve(&self) -> Result<ResolvedField, FieldResolutionError> {
        let fields = self.fetch_fields().await?;
        let resolved = self.select(&fields);

        match resolved.source {
            FieldSource::Fallback => warn!(
                field_name = %self.field_name,
                default_id = %resolved.id,
                scanned = fields.len(),
                "No tracker field matches the configured name; using default field id"
            ),
            _ => debug!(field_id = %resolved.id, "Resolved custom field id by name"),
        }

        Ok(resolved)
    }
}

// ============================================================================
// CachedFieldResolver
// ============================================================================

/// Caches name matches of an inner resolver for a fixed lifetime.
///
/// Only [`FieldSource::Matched`] results are cached. Fallbacks and errors
/// always go back to the inner resolver on the next call.
pub struct CachedFieldResolver {
    inner: Arc<dyn FieldResolver>,
    ttl: Duration,
    cached: RwLock<Option<CachedField>>,
}

struct CachedField {
    field: ResolvedField,
    cached_at: Instant,
}

impl CachedFieldResolver {
    pub fn new(inner: Arc<dyn FieldResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: RwLock::new(None),
        }
    }

    async fn cached_field(&self) -> Option<ResolvedField> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.field.clone())
    }
}

#[async_trait]
impl FieldResolver for CachedFieldResolver {
    async fn resolve(&self) -> Result<ResolvedField, FieldResolutionError> {
        if let Some(field) = self.cached_field().await {
            debug!(field_id = %field.id, "Using cached custom field id");
            return Ok(field);
        }

        let resolved = self.inner.resolve().await?;

        let mut cached = self.cached.write().await;
        *cached = match resolved.source {
            FieldSource::Matched => Some(CachedField {
                field: resolved.clone(),
                cached_at: Instant::now(),
            }),
            _ => None,
        };

        Ok(resolved)
    }
}

#[cfg(test)]
#[path = "field_resolver_tests.rs"]
mod tests;
