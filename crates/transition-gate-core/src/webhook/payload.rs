//! Issue tracker webhook payload.
//!
//! Only the parts of the tracker's issue-updated payload that the gate reads
//! are modelled. Every member is optional on the wire; absent members
//! deserialize to empty values rather than failing the request.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of an issue-updated webhook delivery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub issue_event_type_name: Option<String>,

    #[serde(default)]
    pub changelog: Option<Changelog>,

    #[serde(default)]
    pub issue: Option<Issue>,
}

/// Field transitions carried by the delivery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Changelog {
    #[serde(default)]
    pub items: Vec<ChangeItem>,
}

/// One field transition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeItem {
    #[serde(default)]
    pub field: Option<String>,

    #[serde(default)]
    pub fieldtype: Option<String>,

    #[serde(default)]
    pub from: Option<Value>,

    #[serde(default, rename = "fromString")]
    pub from_label: Option<String>,

    #[serde(default)]
    pub to: Option<Value>,

    /// Display name of the new value, e.g. the new status name
    #[serde(default, rename = "toString")]
    pub to_label: Option<String>,
}

impl ChangeItem {
    /// State the issue moved into
    pub fn to_state(&self) -> Option<&str> {
        self.to_label.as_deref()
    }
}

/// Issue snapshot attached to the delivery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl WebhookPayload {
    /// Normalisable event type, empty when the tracker omitted it
    pub fn event_type(&self) -> &str {
        self.issue_event_type_name.as_deref().unwrap_or_default()
    }

    /// Changelog items in delivery order
    pub fn change_items(&self) -> &[ChangeItem] {
        self.changelog
            .as_ref()
            .map(|changelog| changelog.items.as_slice())
            .unwrap_or_default()
    }

    /// Read the workflow id stored in the issue field `field_id`.
    ///
    /// Strings are returned verbatim and numbers in their JSON form. Missing,
    /// null, blank or structured values yield `None`.
    pub fn workflow_id(&self, field_id: &str) -> Option<String> {
        let value = self.issue.as_ref()?.fields.get(field_id)?;

        match value {
            Value::String(id) if !id.trim().is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}
