//! Work-item categories used in branch names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Feature,
    Bug,
    Chore,
    Update,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Chore => "chore",
            Self::Update => "update",
        }
    }

    /// Parse a category name as used in tags or a "Type" field.
    ///
    /// Accepts a few common synonyms ("fix", "enhancement", "refactor").
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "feature" | "feat" => Some(Self::Feature),
            "bug" | "fix" | "bugfix" => Some(Self::Bug),
            "chore" | "refactor" | "maintenance" => Some(Self::Chore),
            "update" | "enhancement" | "improvement" => Some(Self::Update),
            _ => None,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
