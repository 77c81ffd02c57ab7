//! Platform-neutral projection of a tracked task or issue.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Work-tracking platform a task originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    ClickUp,
    GitHub,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClickUp => "clickup",
            Self::GitHub => "github",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "clickup" => Ok(Self::ClickUp),
            "github" => Ok(Self::GitHub),
            other => Err(format!("unknown platform '{other}', expected clickup or github")),
        }
    }
}

/// A task or issue as seen by the relay.
///
/// Fetched once at run start and treated as read-only. Updates are pushed
/// back through a [`PlatformClient`](crate::domain::ports::PlatformClient),
/// never applied to this value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Stable external identifier (ClickUp task id or GitHub issue number).
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Free-text platform status label.
    #[serde(default)]
    pub status: String,
    pub platform: Platform,
    /// Tag or label names attached to the item.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Custom field values keyed by field name.
    #[serde(default)]
    pub custom_fields: HashMap<String, String>,
    /// Link to the item in the platform UI, when known.
    #[serde(default)]
    pub url: Option<String>,
}

impl WorkItem {
    /// Create a work item with only the identifying fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>, platform: Platform) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: String::new(),
            platform,
            labels: Vec::new(),
            custom_fields: HashMap::new(),
            url: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    #[must_use]
    pub fn with_custom_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(name.into(), value.into());
        self
    }

    /// Look up a custom field by name, ignoring case.
    pub fn custom_field(&self, name: &str) -> Option<&str> {
        self.custom_fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
