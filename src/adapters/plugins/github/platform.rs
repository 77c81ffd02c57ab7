//! GitHub implementations of [`PlatformClient`] and [`PullRequestHost`].
//!
//! Issues have no free-form status or custom fields. Status changes are
//! applied as labels, and custom field writes are skipped: the pull
//! request already links itself to the issue.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Platform, PullRequest, WorkItem};
use crate::domain::ports::{PlatformClient, PullRequestHost};

use super::client::GitHubClient;
use super::models::GitHubIssue;

/// Parse an issue id such as `42` or `#42`.
fn issue_number(id: &str) -> DomainResult<u64> {
    id.trim()
        .trim_start_matches('#')
        .parse()
        .map_err(|_| DomainError::ValidationFailed(format!("'{id}' is not a GitHub issue number")))
}

/// Work-tracker access backed by GitHub issues.
#[derive(Debug, Clone)]
pub struct GitHubPlatform {
    client: Arc<GitHubClient>,
}

impl GitHubPlatform {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }

    fn to_work_item(issue: GitHubIssue) -> WorkItem {
        let mut item = WorkItem::new(issue.number.to_string(), issue.title, Platform::GitHub)
            .with_description(issue.body.unwrap_or_default())
            .with_status(issue.state);
        for label in issue.labels {
            item = item.with_label(label.name);
        }
        item.url = Some(issue.html_url);
        item
    }
}

#[async_trait]
impl PlatformClient for GitHubPlatform {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    async fn get_work_item(&self, id: &str) -> DomainResult<WorkItem> {
        let issue = self.client.get_issue(issue_number(id)?).await?;
        Ok(Self::to_work_item(issue))
    }

    async fn update_status(&self, id: &str, status: &str) -> DomainResult<()> {
        self.client
            .add_labels(issue_number(id)?, vec![status.to_string()])
            .await
    }

    async fn set_custom_field(&self, id: &str, field_name: &str, value: &str) -> DomainResult<()> {
        tracing::debug!(
            issue = id,
            field = field_name,
            value = value,
            "GitHub issues have no custom fields, skipping"
        );
        Ok(())
    }

    async fn add_comment(&self, id: &str, text: &str) -> DomainResult<()> {
        self.client.post_comment(issue_number(id)?, text).await
    }
}

/// Open pull request lookup against a GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubPullRequests {
    client: Arc<GitHubClient>,
}

impl GitHubPullRequests {
    pub fn new(client: Arc<GitHubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PullRequestHost for GitHubPullRequests {
    async fn find_open_pull_request(&self, branch: &str) -> DomainResult<Option<PullRequest>> {
        let pulls = self.client.list_open_pulls(branch).await?;
        Ok(pulls
            .into_iter()
            .filter(|p| p.state == "open" && p.head.ref_name == branch)
            .max_by_key(|p| p.created_at)
            .map(|p| PullRequest {
                url: p.html_url,
                branch: p.head.ref_name,
                created_at: p.created_at,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(server: &Server) -> Arc<GitHubClient> {
        Arc::new(GitHubClient::new("ghp_test", server.url(), "acme", "widgets", 600))
    }

    #[test]
    fn test_issue_number_parsing() {
        assert_eq!(issue_number("42").unwrap(), 42);
        assert_eq!(issue_number("#7").unwrap(), 7);
        assert!(issue_number("abc").is_err());
    }

    #[tokio::test]
    async fn test_get_work_item_maps_issue() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues/42")
            .with_status(200)
            .with_body(
                json!({
                    "number": 42,
                    "title": "Refactor session store",
                    "body": "Split the module",
                    "state": "open",
                    "labels": [{"name": "chore"}],
                    "html_url": "https://github.com/acme/widgets/issues/42"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let item = GitHubPlatform::new(client(&server))
            .get_work_item("#42")
            .await
            .unwrap();
        assert_eq!(item.id, "42");
        assert_eq!(item.platform, Platform::GitHub);
        assert_eq!(item.description, "Split the module");
        assert_eq!(item.labels, vec!["chore".to_string()]);
    }

    #[tokio::test]
    async fn test_find_open_pull_request_picks_newest_exact_branch() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/pulls")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!([
                    {
                        "number": 3,
                        "html_url": "https://github.com/acme/widgets/pull/3",
                        "state": "open",
                        "created_at": "2024-03-01T10:00:00Z",
                        "head": {"ref": "42/feature/login"}
                    },
                    {
                        "number": 5,
                        "html_url": "https://github.com/acme/widgets/pull/5",
                        "state": "open",
                        "created_at": "2024-03-02T10:00:00Z",
                        "head": {"ref": "42/feature/login"}
                    },
                    {
                        "number": 6,
                        "html_url": "https://github.com/acme/widgets/pull/6",
                        "state": "open",
                        "created_at": "2024-03-03T10:00:00Z",
                        "head": {"ref": "42/feature/login-v2"}
                    }
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let pr = GitHubPullRequests::new(client(&server))
            .find_open_pull_request("42/feature/login")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pr.url, "https://github.com/acme/widgets/pull/5");
        assert_eq!(pr.branch, "42/feature/login");
    }

    #[tokio::test]
    async fn test_find_open_pull_request_none() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/pulls")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let found = GitHubPullRequests::new(client(&server))
            .find_open_pull_request("1/bug/x")
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
