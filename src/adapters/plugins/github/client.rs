//! GitHub HTTP client with rate limiting.
//!
//! Wraps the GitHub REST API v3 for a single repository: issue reads,
//! comments, labels and open pull request listing.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Method, Response, StatusCode};

use crate::adapters::plugins::http_client;
use crate::domain::errors::{DomainError, DomainResult};

use super::models::{GitHubCommentRequest, GitHubIssue, GitHubLabelsRequest, GitHubPull};

/// Upper bound on one API call, including reading the body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one GitHub repository.
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    token: String,
    api_base: String,
    owner: String,
    repo: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(
        token: impl Into<String>,
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        requests_per_minute: u32,
    ) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            http: http_client(DEFAULT_REQUEST_TIMEOUT),
            token: token.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    /// Replace the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Wait for a rate-limit slot and build an authorized request for a
    /// path below `/repos/{owner}/{repo}`.
    async fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.limiter.until_ready().await;
        self.http
            .request(
                method,
                format!("{}/repos/{}/{}{path}", self.api_base, self.owner, self.repo),
            )
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "taskrelay")
    }

    async fn check(resp: Response, operation: &str) -> DomainResult<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(DomainError::PlatformApi(format!(
            "GitHub {operation} returned {status}: {body}"
        )))
    }

    /// Fetch an issue by number.
    pub async fn get_issue(&self, number: u64) -> DomainResult<GitHubIssue> {
        let resp = self
            .request(Method::GET, &format!("/issues/{number}"))
            .await
            .send()
            .await
            .map_err(|e| DomainError::PlatformApi(format!("GitHub get_issue request failed: {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(DomainError::WorkItemNotFound(number.to_string()));
        }
        let resp = Self::check(resp, "get_issue").await?;

        resp.json::<GitHubIssue>()
            .await
            .map_err(|e| DomainError::SerializationError(format!("GitHub get_issue parse failed: {e}")))
    }

    /// Post a comment on an issue.
    pub async fn post_comment(&self, number: u64, comment: &str) -> DomainResult<()> {
        let body = GitHubCommentRequest {
            body: comment.to_string(),
        };
        let resp = self
            .request(Method::POST, &format!("/issues/{number}/comments"))
            .await
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::PlatformApi(format!("GitHub post_comment request failed: {e}")))?;

        Self::check(resp, "post_comment").await?;
        Ok(())
    }

    /// Add labels to an issue, keeping the existing ones.
    pub async fn add_labels(&self, number: u64, labels: Vec<String>) -> DomainResult<()> {
        let body = GitHubLabelsRequest { labels };
        let resp = self
            .request(Method::POST, &format!("/issues/{number}/labels"))
            .await
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::PlatformApi(format!("GitHub add_labels request failed: {e}")))?;

        Self::check(resp, "add_labels").await?;
        Ok(())
    }

    /// List open pull requests whose head is `{owner}:{branch}`.
    pub async fn list_open_pulls(&self, branch: &str) -> DomainResult<Vec<GitHubPull>> {
        let head = format!("{}:{branch}", self.owner);
        let resp = self
            .request(Method::GET, "/pulls")
            .await
            .query(&[("state", "open"), ("head", head.as_str()), ("per_page", "100")])
            .send()
            .await
            .map_err(|e| DomainError::PlatformApi(format!("GitHub list_pulls request failed: {e}")))?;

        let resp = Self::check(resp, "list_pulls").await?;
        resp.json::<Vec<GitHubPull>>()
            .await
            .map_err(|e| DomainError::SerializationError(format!("GitHub list_pulls parse failed: {e}")))
    }
}
