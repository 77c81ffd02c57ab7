//! GitHub REST API response and request models.
//!
//! These structs map to the GitHub REST API v3 JSON payloads.
//! They are used internally by the GitHub adapter and are not
//! part of the public domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An issue returned by the GitHub API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubIssue {
    /// Sequential number within the repository (e.g., 42 → "#42").
    pub number: u64,
    /// Issue title.
    pub title: String,
    /// Issue body text (may be absent or null).
    #[serde(default)]
    pub body: Option<String>,
    /// Current state: "open" or "closed".
    pub state: String,
    /// Labels applied to the issue.
    #[serde(default)]
    pub labels: Vec<GitHubLabel>,
    /// URL to view the issue in the GitHub UI.
    pub html_url: String,
}

/// A label applied to a GitHub issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubLabel {
    /// The label name (e.g., "bug", "priority: high").
    pub name: String,
}

/// A pull request as listed by `GET /repos/{owner}/{repo}/pulls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubPull {
    pub number: u64,
    pub html_url: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub head: GitHubPullHead,
}

/// Head side of a pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubPullHead {
    /// Branch name without the owner prefix.
    #[serde(rename = "ref")]
    pub ref_name: String,
}

/// Request body for posting a comment on an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommentRequest {
    /// The comment body (plain text or Markdown).
    pub body: String,
}

/// Request body for adding labels to an issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubLabelsRequest {
    pub labels: Vec<String>,
}
