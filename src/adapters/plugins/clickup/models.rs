//! ClickUp API response and request models.
//!
//! These structs map to the ClickUp REST API v2 JSON payloads.
//! They are used internally by the ClickUp adapter and are not
//! part of the public domain model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A task returned by the ClickUp API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickUpTask {
    /// Unique task identifier (e.g., "86abc123").
    pub id: String,
    /// Task name / title.
    pub name: String,
    /// Task description (may be empty or contain markdown).
    #[serde(default)]
    pub description: Option<String>,
    /// Plain-text rendering of the description.
    #[serde(default)]
    pub text_content: Option<String>,
    /// Current status of the task.
    pub status: ClickUpStatus,
    /// URL to view the task in the ClickUp UI.
    #[serde(default)]
    pub url: Option<String>,
    /// Tags applied to the task.
    #[serde(default)]
    pub tags: Vec<ClickUpTag>,
    /// Custom fields defined on the task's list, with their values.
    #[serde(default)]
    pub custom_fields: Vec<ClickUpCustomField>,
    /// Reference to the list this task belongs to.
    #[serde(default)]
    pub list: Option<ClickUpListRef>,
}

/// The status of a ClickUp task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickUpStatus {
    /// The status string (e.g., "open", "in progress", "closed").
    pub status: String,
    /// Optional status type (e.g., "open", "closed", "custom").
    #[serde(rename = "type", default)]
    pub status_type: Option<String>,
}

/// A tag applied to a ClickUp task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickUpTag {
    /// The tag name.
    pub name: String,
}

/// A reference to a ClickUp list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickUpListRef {
    /// The list's unique identifier.
    pub id: String,
    /// The list's display name (may be absent in some responses).
    #[serde(default)]
    pub name: Option<String>,
}

/// A custom field as embedded in a task response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickUpCustomField {
    /// Field id used by the "set custom field value" endpoint.
    pub id: String,
    /// Display name, e.g. "GitHub Branch".
    pub name: String,
    /// Field type (e.g., "short_text", "url", "drop_down").
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    /// Type-specific settings; dropdown options live here.
    #[serde(default)]
    pub type_config: Option<Value>,
    /// Current value, absent when unset.
    #[serde(default)]
    pub value: Option<Value>,
}

impl ClickUpCustomField {
    /// The field's value as text.
    ///
    /// Dropdown values are stored as an option index (or option id) and are
    /// resolved to the option name.
    pub fn display_value(&self) -> Option<String> {
        let value = self.value.as_ref()?;
        if self.field_type.as_deref() == Some("drop_down") {
            if let Some(name) = self.dropdown_option_name(value) {
                return Some(name);
            }
        }
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn dropdown_option_name(&self, value: &Value) -> Option<String> {
        let options = self.type_config.as_ref()?.get("options")?.as_array()?;
        options
            .iter()
            .find(|option| {
                option.get("orderindex") == Some(value)
                    || value
                        .as_str()
                        .is_some_and(|id| option.get("id").and_then(Value::as_str) == Some(id))
            })
            .and_then(|option| option.get("name"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }
}

/// Request body for posting a comment on a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickUpCommentRequest {
    /// The comment text.
    pub comment_text: String,
    /// Whether to notify all task watchers.
    #[serde(default)]
    pub notify_all: bool,
}

/// Request body for setting a custom field value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickUpFieldValueRequest {
    pub value: Value,
}
