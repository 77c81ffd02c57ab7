//! Webhook receiver.
//!
//! Accepts ClickUp and GitHub deliveries, decides whether they should start
//! a run, and hands accepted ones to the [`RunOrchestrator`] in the
//! background. Every delivery is answered with HTTP 200 and a small status
//! document so the sender never retries; the run itself proceeds
//! independently of the response.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::signature::{verify_github_signature, verify_shared_secret};
use crate::application::{RunOrchestrator, RunTrigger};
use crate::domain::models::{ClickUpConfig, Config, GitHubConfig, Platform};
use crate::infrastructure::logging::SecretScrubber;

/// What to do with one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDecision {
    /// Platform connectivity check.
    Pong,
    Trigger { task_id: String, reason: String },
    Ignore { reason: String },
    Reject { error: String },
}

impl WebhookDecision {
    fn ignore(reason: impl Into<String>) -> Self {
        Self::Ignore {
            reason: reason.into(),
        }
    }

    fn reject(error: impl Into<String>) -> Self {
        Self::Reject {
            error: error.into(),
        }
    }
}

/// Render a JSON scalar as the string ClickUp ids are compared by.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decide what a ClickUp delivery means.
pub fn clickup_decision(payload: &Value, settings: &ClickUpConfig) -> WebhookDecision {
    let event = payload.get("event").and_then(Value::as_str).unwrap_or_default();
    if event == "ping" {
        return WebhookDecision::Pong;
    }

    let task_id = payload
        .get("task_id")
        .and_then(id_string)
        .or_else(|| {
            payload
                .pointer("/history_items/0/task_id")
                .and_then(id_string)
        });
    let Some(task_id) = task_id else {
        return WebhookDecision::reject("No task_id provided");
    };

    match event {
        "taskCreated" => {
            if let Some(expected) = settings.list_id.as_deref().filter(|l| !l.is_empty()) {
                let list_id = payload.get("list_id").and_then(id_string);
                if list_id.as_deref() != Some(expected) {
                    return WebhookDecision::ignore(format!("Task not in configured list {expected}"));
                }
            }
            WebhookDecision::Trigger {
                task_id,
                reason: "New task created".to_string(),
            }
        }
        "taskCommentPosted" => {
            let comment = payload
                .pointer("/comment/comment_text")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if comment.trim().eq_ignore_ascii_case(&settings.trigger_comment) {
                WebhookDecision::Trigger {
                    task_id,
                    reason: format!("Comment with '{}' command", settings.trigger_comment),
                }
            } else {
                WebhookDecision::ignore("Comment is not a trigger command")
            }
        }
        other => WebhookDecision::ignore(format!("Not a triggering event (event={other})")),
    }
}

/// Decide what a GitHub delivery means. `event` is the `X-GitHub-Event` header.
pub fn github_decision(event: &str, payload: &Value, settings: &GitHubConfig) -> WebhookDecision {
    if event == "ping" {
        return WebhookDecision::Pong;
    }

    let action = payload.get("action").and_then(Value::as_str).unwrap_or_default();
    let Some(number) = payload.pointer("/issue/number").and_then(Value::as_u64) else {
        return WebhookDecision::ignore(format!("Not an issue event (event={event})"));
    };
    // Comments on pull requests arrive as issue_comment with this marker.
    if payload.pointer("/issue/pull_request").is_some_and(|v| !v.is_null()) {
        return WebhookDecision::ignore("Pull request comments do not trigger runs");
    }
    let task_id = number.to_string();

    match (event, action) {
        ("issues", "opened") => WebhookDecision::Trigger {
            task_id,
            reason: "New issue opened".to_string(),
        },
        ("issue_comment", "created") => {
            let body = payload
                .pointer("/comment/body")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if body.trim().eq_ignore_ascii_case(&settings.trigger_comment) {
                WebhookDecision::Trigger {
                    task_id,
                    reason: format!("Comment with '{}' command", settings.trigger_comment),
                }
            } else {
                WebhookDecision::ignore("Comment is not a trigger command")
            }
        }
        _ => WebhookDecision::ignore(format!(
            "Not a triggering event (event={event}, action={action})"
        )),
    }
}

/// Shared state for the webhook server.
pub struct WebhookState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<RunOrchestrator>,
    pub scrubber: SecretScrubber,
}

impl WebhookState {
    pub fn new(config: Arc<Config>, orchestrator: Arc<RunOrchestrator>, scrubber: SecretScrubber) -> Self {
        Self {
            config,
            orchestrator,
            scrubber,
        }
    }

    /// Turn a decision into the response document, starting a run if needed.
    fn dispatch(&self, platform: Platform, source: &str, decision: WebhookDecision) -> Value {
        match decision {
            WebhookDecision::Pong => json!({
                "status": "ok",
                "message": "Pong! Webhook is configured correctly",
            }),
            WebhookDecision::Reject { error } => {
                warn!(platform = %platform, error = %error, "Webhook rejected");
                json!({ "status": "error", "error": error })
            }
            WebhookDecision::Ignore { reason } => {
                debug!(platform = %platform, reason = %reason, "Webhook ignored");
                json!({ "status": "ignored", "reason": reason })
            }
            WebhookDecision::Trigger { task_id, reason } => {
                if !self.orchestrator.supports(platform) {
                    warn!(platform = %platform, task_id = %task_id, "Trigger for unconfigured platform");
                    return json!({
                        "status": "error",
                        "error": format!("{platform} is not configured"),
                    });
                }
                let trigger = RunTrigger::new(platform, task_id.clone(), source);
                let run_id = trigger.run_id;
                info!(platform = %platform, task_id = %task_id, run_id = %run_id, reason = %reason, "Run triggered");
                self.orchestrator.spawn(trigger);
                json!({
                    "status": "accepted",
                    "task": task_id,
                    "run_id": run_id,
                    "message": format!("Run triggered for task {task_id}"),
                    "reason": reason,
                })
            }
        }
    }

    fn log_payload(&self, platform: Platform, body: &[u8]) {
        if tracing::enabled!(tracing::Level::DEBUG) {
            let text = String::from_utf8_lossy(body);
            debug!(platform = %platform, payload = %self.scrubber.scrub_message(&text), "Webhook payload");
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn clickup_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    match state.config.clickup.webhook_secret.as_deref().filter(|s| !s.is_empty()) {
        Some(secret) => {
            if !verify_shared_secret(secret, header(&headers, "x-signature")) {
                warn!("Invalid ClickUp webhook signature");
                return Json(json!({ "status": "error", "error": "Invalid signature" }));
            }
        }
        None => warn!("clickup.webhook_secret not set, signature verification disabled"),
    }

    state.log_payload(Platform::ClickUp, &body);
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "ClickUp webhook body is not JSON");
            return Json(json!({ "status": "error", "error": "Invalid JSON" }));
        }
    };

    let event = payload.get("event").and_then(Value::as_str).unwrap_or("unknown");
    let source = format!("clickup:{event}");
    let decision = clickup_decision(&payload, &state.config.clickup);
    Json(state.dispatch(Platform::ClickUp, &source, decision))
}

async fn github_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    match state.config.github.webhook_secret.as_deref().filter(|s| !s.is_empty()) {
        Some(secret) => {
            if !verify_github_signature(secret, &body, header(&headers, "x-hub-signature-256")) {
                warn!("Invalid GitHub webhook signature");
                return Json(json!({ "status": "error", "error": "Invalid signature" }));
            }
        }
        None => warn!("github.webhook_secret not set, signature verification disabled"),
    }

    state.log_payload(Platform::GitHub, &body);
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "GitHub webhook body is not JSON");
            return Json(json!({ "status": "error", "error": "Invalid JSON" }));
        }
    };

    let event = header(&headers, "x-github-event").unwrap_or_default();
    let source = format!("github:{event}");
    let decision = github_decision(event, &payload, &state.config.github);
    Json(state.dispatch(Platform::GitHub, &source, decision))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "taskrelay" }))
}

/// HTTP server receiving platform webhooks.
pub struct WebhookServer {
    state: Arc<WebhookState>,
}

impl WebhookServer {
    pub fn new(state: WebhookState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Build the router with all endpoints.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/clickup-webhook", post(clickup_webhook))
            .route("/github-webhook", post(github_webhook))
            .route("/health", get(health_check))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server = &self.state.config.server;
        let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
        let router = self.router();

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Webhook server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::signature::github_signature;
    use crate::domain::errors::{DomainError, DomainResult};
    use crate::domain::models::{PullRequest, WorkItem};
    use crate::domain::ports::{PlatformClient, PullRequestHost, WorkspaceProvider};
    use crate::services::SentinelClassifier;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::path::{Path, PathBuf};
    use tower::ServiceExt;

    /// Platform whose items never exist, so spawned runs end at once.
    struct MissingItems(Platform);

    #[async_trait]
    impl PlatformClient for MissingItems {
        fn platform(&self) -> Platform {
            self.0
        }
        async fn get_work_item(&self, id: &str) -> DomainResult<WorkItem> {
            Err(DomainError::WorkItemNotFound(id.to_string()))
        }
        async fn update_status(&self, _: &str, _: &str) -> DomainResult<()> {
            Ok(())
        }
        async fn set_custom_field(&self, _: &str, _: &str, _: &str) -> DomainResult<()> {
            Ok(())
        }
        async fn add_comment(&self, _: &str, _: &str) -> DomainResult<()> {
            Ok(())
        }
    }

    struct NoPulls;

    #[async_trait]
    impl PullRequestHost for NoPulls {
        async fn find_open_pull_request(&self, _: &str) -> DomainResult<Option<PullRequest>> {
            Ok(None)
        }
    }

    struct NoWorkspaces;

    #[async_trait]
    impl WorkspaceProvider for NoWorkspaces {
        async fn provision(&self, branch: &str) -> DomainResult<PathBuf> {
            Err(DomainError::Workspace(format!("not provisioning {branch}")))
        }
        async fn release(&self, _: &Path) -> DomainResult<()> {
            Ok(())
        }
    }

    fn server(config: Config) -> WebhookServer {
        let config = Arc::new(config);
        let classifier = Arc::new(SentinelClassifier::new("AUTOMATION_COMPLETE", "## Manual Steps").unwrap());
        let orchestrator = RunOrchestrator::new(
            Arc::clone(&config),
            Arc::new(NoPulls),
            Arc::new(NoWorkspaces),
            classifier,
        )
        .with_platform(Arc::new(MissingItems(Platform::ClickUp)));
        let scrubber = SecretScrubber::new(Vec::<String>::new()).unwrap();
        WebhookServer::new(WebhookState::new(config, Arc::new(orchestrator), scrubber))
    }

    async fn post(router: Router, uri: &str, headers: &[(&str, &str)], body: &str) -> (StatusCode, Value) {
        let mut request = Request::builder().method("POST").uri(uri);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = router
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_clickup_decisions() {
        let settings = ClickUpConfig::default();

        assert_eq!(clickup_decision(&json!({"event": "ping"}), &settings), WebhookDecision::Pong);
        assert_eq!(
            clickup_decision(&json!({"event": "taskCreated", "task_id": "86a"}), &settings),
            WebhookDecision::Trigger {
                task_id: "86a".into(),
                reason: "New task created".into()
            }
        );
        assert!(matches!(
            clickup_decision(&json!({"event": "taskCreated"}), &settings),
            WebhookDecision::Reject { .. }
        ));
        assert!(matches!(
            clickup_decision(&json!({"event": "taskUpdated", "task_id": "86a"}), &settings),
            WebhookDecision::Ignore { .. }
        ));
    }

    #[test]
    fn test_clickup_task_id_from_history() {
        let payload = json!({
            "event": "taskCommentPosted",
            "history_items": [{"task_id": "86b"}],
            "comment": {"comment_text": "  ADW \n"}
        });
        assert!(matches!(
            clickup_decision(&payload, &ClickUpConfig::default()),
            WebhookDecision::Trigger { task_id, .. } if task_id == "86b"
        ));

        let other = json!({"event": "taskCommentPosted", "task_id": "86b", "comment": {"comment_text": "adw please"}});
        assert!(matches!(
            clickup_decision(&other, &ClickUpConfig::default()),
            WebhookDecision::Ignore { .. }
        ));
    }

    #[test]
    fn test_clickup_list_filter() {
        let settings = ClickUpConfig {
            list_id: Some("901".into()),
            ..ClickUpConfig::default()
        };
        let outside = json!({"event": "taskCreated", "task_id": "1", "list_id": "555"});
        let inside = json!({"event": "taskCreated", "task_id": "1", "list_id": 901});
        assert!(matches!(clickup_decision(&outside, &settings), WebhookDecision::Ignore { .. }));
        assert!(matches!(clickup_decision(&inside, &settings), WebhookDecision::Trigger { .. }));
    }

    #[test]
    fn test_github_decisions() {
        let settings = GitHubConfig::default();
        let opened = json!({"action": "opened", "issue": {"number": 42}});
        assert!(matches!(
            github_decision("issues", &opened, &settings),
            WebhookDecision::Trigger { task_id, .. } if task_id == "42"
        ));

        let closed = json!({"action": "closed", "issue": {"number": 42}});
        assert!(matches!(github_decision("issues", &closed, &settings), WebhookDecision::Ignore { .. }));

        let comment = json!({"action": "created", "issue": {"number": 7}, "comment": {"body": "adw"}});
        assert!(matches!(
            github_decision("issue_comment", &comment, &settings),
            WebhookDecision::Trigger { task_id, .. } if task_id == "7"
        ));

        let pr_comment = json!({
            "action": "created",
            "issue": {"number": 7, "pull_request": {"url": "u"}},
            "comment": {"body": "adw"}
        });
        assert!(matches!(
            github_decision("issue_comment", &pr_comment, &settings),
            WebhookDecision::Ignore { .. }
        ));
        assert_eq!(github_decision("ping", &json!({}), &settings), WebhookDecision::Pong);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = server(Config::default())
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"status": "healthy", "service": "taskrelay"}));
    }

    #[tokio::test]
    async fn test_clickup_signature_mismatch_still_200() {
        let mut config = Config::default();
        config.clickup.webhook_secret = Some("s3cret".into());
        let router = server(config).router();

        let (status, body) = post(
            router.clone(),
            "/clickup-webhook",
            &[("x-signature", "wrong")],
            r#"{"event":"taskCreated","task_id":"86a"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");

        let (_, body) = post(router, "/clickup-webhook", &[("x-signature", "s3cret")], r#"{"event":"ping"}"#).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_clickup_accepts_trigger() {
        let router = server(Config::default()).router();
        let (status, body) = post(
            router,
            "/clickup-webhook",
            &[],
            r#"{"event":"taskCreated","task_id":"86a"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "accepted");
        assert_eq!(body["task"], "86a");
        assert!(body["run_id"].is_string());
    }

    #[tokio::test]
    async fn test_clickup_invalid_json() {
        let router = server(Config::default()).router();
        let (status, body) = post(router, "/clickup-webhook", &[], "not json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], "Invalid JSON");
    }

    #[tokio::test]
    async fn test_github_signature_and_unconfigured_platform() {
        let mut config = Config::default();
        config.github.webhook_secret = Some("gh-secret".into());
        let router = server(config).router();
        let payload = r#"{"action":"opened","issue":{"number":42}}"#;

        let (_, body) = post(
            router.clone(),
            "/github-webhook",
            &[("x-github-event", "issues"), ("x-hub-signature-256", "sha256=00")],
            payload,
        )
        .await;
        assert_eq!(body["error"], "Invalid signature");

        let signature = github_signature("gh-secret", payload.as_bytes()).unwrap();
        let (status, body) = post(
            router,
            "/github-webhook",
            &[("x-github-event", "issues"), ("x-hub-signature-256", signature.as_str())],
            payload,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        // Only ClickUp is registered on this orchestrator.
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "github is not configured");
    }
}
