//! Pull requests observed on the version-control host.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An open pull request, as needed for completion evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub url: String,
    /// Source branch name.
    pub branch: String,
    pub created_at: DateTime<Utc>,
}

impl PullRequest {
    /// Whether the PR was opened within `window` of `now`.
    ///
    /// A PR stamped slightly in the future (clock skew) counts as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now.signed_duration_since(self.created_at) <= window
    }
}
