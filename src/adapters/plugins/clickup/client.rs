//! ClickUp HTTP client with rate limiting.
//!
//! Wraps the ClickUp REST API v2, providing typed methods for the
//! operations the relay needs. Requests are throttled with a `governor`
//! limiter to stay within ClickUp's per-minute API limit.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;

use crate::adapters::plugins::http_client;
use crate::domain::errors::{DomainError, DomainResult};

use super::models::{ClickUpCommentRequest, ClickUpFieldValueRequest, ClickUpTask};

/// Upper bound on one API call, including reading the body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the ClickUp REST API v2.
///
/// All methods return [`DomainResult`] and map HTTP / network errors
/// to [`DomainError::PlatformApi`].
#[derive(Clone)]
pub struct ClickUpClient {
    /// The underlying HTTP client.
    http: Client,
    /// ClickUp personal API token.
    api_key: String,
    /// API root, without trailing slash.
    api_base: String,
    /// Shared request limiter.
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for ClickUpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickUpClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl ClickUpClient {
    /// Create a client for `api_base` allowing `requests_per_minute` calls.
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>, requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            http: http_client(DEFAULT_REQUEST_TIMEOUT),
            api_key: api_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))),
        }
    }

    /// Replace the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    /// Wait for a rate-limit slot and build an authorized request.
    async fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.limiter.until_ready().await;
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .header("Authorization", &self.api_key)
            .header("Content-Type", "application/json")
    }

    /// Map a non-success response to an error.
    async fn check(resp: Response, operation: &str) -> DomainResult<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(DomainError::PlatformApi(format!(
            "ClickUp {operation} returned {status}: {body}"
        )))
    }

    /// Fetch a single task, including its custom fields.
    pub async fn get_task(&self, task_id: &str) -> DomainResult<ClickUpTask> {
        let resp = self
            .request(Method::GET, &format!("/task/{task_id}"))
            .await
            .send()
            .await
            .map_err(|e| DomainError::PlatformApi(format!("ClickUp get_task request failed: {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(DomainError::WorkItemNotFound(task_id.to_string()));
        }
        let resp = Self::check(resp, "get_task").await?;

        resp.json::<ClickUpTask>()
            .await
            .map_err(|e| DomainError::SerializationError(format!("ClickUp get_task parse failed: {e}")))
    }

    /// Update the status of a ClickUp task.
    pub async fn update_task_status(&self, task_id: &str, status: &str) -> DomainResult<()> {
        let body = serde_json::json!({ "status": status });
        let resp = self
            .request(Method::PUT, &format!("/task/{task_id}"))
            .await
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                DomainError::PlatformApi(format!("ClickUp update_task_status request failed: {e}"))
            })?;

        Self::check(resp, "update_task_status").await?;
        Ok(())
    }

    /// Post a comment on a ClickUp task.
    pub async fn post_comment(&self, task_id: &str, comment: &str) -> DomainResult<()> {
        let body = ClickUpCommentRequest {
            comment_text: comment.to_string(),
            notify_all: false,
        };
        let resp = self
            .request(Method::POST, &format!("/task/{task_id}/comment"))
            .await
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::PlatformApi(format!("ClickUp post_comment request failed: {e}")))?;

        Self::check(resp, "post_comment").await?;
        Ok(())
    }

    /// Set a custom field value by field id.
    pub async fn set_custom_field_value(
        &self,
        task_id: &str,
        field_id: &str,
        value: Value,
    ) -> DomainResult<()> {
        let body = ClickUpFieldValueRequest { value };
        let resp = self
            .request(Method::POST, &format!("/task/{task_id}/field/{field_id}"))
            .await
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                DomainError::PlatformApi(format!("ClickUp set_custom_field request failed: {e}"))
            })?;

        Self::check(resp, "set_custom_field").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_task_sends_api_key() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/task/86abc")
            .match_header("authorization", "pk_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"id": "86abc", "name": "Add login", "status": {"status": "to do"}}).to_string(),
            )
            .create_async()
            .await;

        let client = ClickUpClient::new("pk_test", server.url(), 100);
        let task = client.get_task("86abc").await.unwrap();

        assert_eq!(task.name, "Add login");
        assert_eq!(task.status.status, "to do");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_task_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/task/missing")
            .with_status(404)
            .with_body(r#"{"err":"Task not found"}"#)
            .create_async()
            .await;

        let client = ClickUpClient::new("pk_test", server.url(), 100);
        let err = client.get_task("missing").await.unwrap_err();
        assert!(matches!(err, DomainError::WorkItemNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_update_status_error_is_reported() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/task/86abc")
            .match_body(Matcher::Json(json!({"status": "in progress"})))
            .with_status(400)
            .with_body("Status does not exist")
            .create_async()
            .await;

        let client = ClickUpClient::new("pk_test", server.url(), 100);
        let err = client.update_task_status("86abc", "in progress").await.unwrap_err();
        assert!(err.to_string().contains("Status does not exist"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_custom_field_value() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/task/86abc/field/f1")
            .match_body(Matcher::Json(json!({"value": "86abc/feature/add-login"})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = ClickUpClient::new("pk_test", format!("{}/", server.url()), 100);
        client
            .set_custom_field_value("86abc", "f1", json!("86abc/feature/add-login"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        use std::io::Write;

        let mut server = Server::new_async().await;
        server
            .mock("GET", "/task/86abc")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(br#"{"id": "86abc", "name": "late", "status": {"status": "to do"}}"#)
            })
            .create_async()
            .await;

        let client = ClickUpClient::new("pk_test", server.url(), 100)
            .with_request_timeout(Duration::from_millis(300));
        let started = std::time::Instant::now();
        assert!(client.get_task("86abc").await.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
