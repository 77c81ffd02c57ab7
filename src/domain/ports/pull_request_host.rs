//! Version-control host port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::PullRequest;

/// Query side of the host where the agent opens its pull request.
#[async_trait]
pub trait PullRequestHost: Send + Sync {
    /// Most recently created open PR whose source branch is exactly `branch`.
    async fn find_open_pull_request(&self, branch: &str) -> DomainResult<Option<PullRequest>>;
}
