//! Native platform plugins.
//!
//! Each sub-module corresponds to an external system and implements the
//! domain port traits directly.

pub mod clickup;
pub mod github;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Config, PullRequest};
use crate::domain::ports::PullRequestHost;

use self::clickup::{ClickUpClient, ClickUpPlatform};
use self::github::{GitHubClient, GitHubPlatform, GitHubPullRequests};

/// HTTP client whose requests give up after `timeout`.
pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
        Client::new()
    })
}

/// Build the ClickUp platform client when an API key is configured.
pub fn clickup_platform(config: &Config) -> Option<ClickUpPlatform> {
    let key = config.clickup.api_key.as_deref().filter(|k| !k.is_empty())?;
    let client = ClickUpClient::new(key, &config.clickup.api_base, config.clickup.requests_per_minute)
        .with_request_timeout(Duration::from_secs(config.clickup.request_timeout_secs));
    Some(ClickUpPlatform::new(Arc::new(client)))
}

/// Build the shared GitHub client when a token and repository are known.
pub fn github_client(config: &Config) -> Option<Arc<GitHubClient>> {
    let github = &config.github;
    let token = github.token.as_deref().filter(|t| !t.is_empty())?;
    let owner = github.owner.as_deref().filter(|o| !o.is_empty())?;
    let repo = github.repo.as_deref().filter(|r| !r.is_empty())?;
    let client = GitHubClient::new(token, &github.api_base, owner, repo, github.requests_per_minute)
        .with_request_timeout(Duration::from_secs(github.request_timeout_secs));
    Some(Arc::new(client))
}

/// GitHub issue platform and pull request host sharing one client.
pub fn github_adapters(client: &Arc<GitHubClient>) -> (GitHubPlatform, GitHubPullRequests) {
    (
        GitHubPlatform::new(Arc::clone(client)),
        GitHubPullRequests::new(Arc::clone(client)),
    )
}

/// Pull request host used when no GitHub repository is configured.
///
/// Every lookup fails permanently, so runs can still finish on an
/// explicit signal but never attribute a PR.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredPullRequests;

#[async_trait]
impl PullRequestHost for UnconfiguredPullRequests {
    async fn find_open_pull_request(&self, _branch: &str) -> DomainResult<Option<PullRequest>> {
        Err(DomainError::Unsupported {
            platform: "github".to_string(),
            operation: "pull request lookup without github.token, owner and repo".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clickup_requires_api_key() {
        let mut config = Config::default();
        assert!(clickup_platform(&config).is_none());
        config.clickup.api_key = Some(String::new());
        assert!(clickup_platform(&config).is_none());
        config.clickup.api_key = Some("pk_1".into());
        assert!(clickup_platform(&config).is_some());
    }

    #[test]
    fn test_github_requires_token_and_repository() {
        let mut config = Config::default();
        config.github.token = Some("ghp".into());
        assert!(github_client(&config).is_none());
        config.github.owner = Some("acme".into());
        config.github.repo = Some("widgets".into());
        let client = github_client(&config).unwrap();
        assert_eq!(client.owner(), "acme");
    }

    #[tokio::test]
    async fn test_unconfigured_pull_requests_fail_permanently() {
        let err = UnconfiguredPullRequests
            .find_open_pull_request("1/bug/x")
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
