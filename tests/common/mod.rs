//! Common test utilities for integration tests
//!
//! Provides throwaway git repositories, fake agent commands and in-memory
//! fakes for the work tracker and pull-request host.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use taskrelay::application::RunOrchestrator;
use taskrelay::domain::errors::{DomainError, DomainResult};
use taskrelay::domain::models::{Config, Platform, PullRequest, WorkItem};
use taskrelay::domain::ports::{PlatformClient, PullRequestHost};
use taskrelay::services::{SentinelClassifier, WorkspaceService};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn git(path: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(path)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Setup a git repository in a temp directory for testing
///
/// Creates an initialized repo on `main` with one empty commit and no remote.
/// Returns the TempDir (for lifetime management) and the path to the repo.
pub fn setup_test_git_repo() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir for git repo");
    let path = dir.path().to_path_buf();

    git(&path, &["init", "--quiet"]);
    git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(&path, &["config", "user.email", "test@test.com"]);
    git(&path, &["config", "user.name", "Test User"]);
    git(&path, &["config", "commit.gpgsign", "false"]);
    git(&path, &["commit", "--allow-empty", "--quiet", "-m", "initial commit"]);

    (dir, path)
}

/// Names of the branches in `repo`.
pub fn branches(repo: &Path) -> Vec<String> {
    let output = Command::new("git")
        .args(["branch", "--format=%(refname:short)"])
        .current_dir(repo)
        .output()
        .expect("Failed to list branches");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(ToString::to_string)
        .collect()
}

/// Everything a run needs on disk: a repository and a run log directory.
pub struct Sandbox {
    _repo_dir: TempDir,
    pub repo: PathBuf,
    pub logs: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let (repo_dir, repo) = setup_test_git_repo();
        Self {
            _repo_dir: repo_dir,
            repo,
            logs: tempfile::tempdir().expect("Failed to create log dir"),
        }
    }

    /// Configuration whose agent is `sh -c <script>`, with short timers.
    pub fn config(&self, script: &str) -> Config {
        let mut config = Config::default();
        config.repository.path = self.repo.clone();
        config.logging.run_log_dir = self.logs.path().to_path_buf();

        config.agent.binary_path = "sh".to_string();
        config.agent.args = vec!["-c".to_string(), script.to_string()];
        config.agent.model = String::new();
        config.agent.allowed_tools = Vec::new();
        config.agent.timeout_secs = 20;
        config.agent.kill_grace_secs = 1;
        config.agent.completion_grace_secs = 5;

        config.reconcile.pr_lookup_attempts = 3;
        config.reconcile.pr_lookup_interval_ms = 20;
        config
    }

    /// Worktree directories left under the default worktree root.
    pub fn worktrees(&self) -> Vec<PathBuf> {
        let root = self.repo.join(".taskrelay/worktrees");
        std::fs::read_dir(root)
            .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    /// Contents of every run log written so far.
    pub fn run_logs(&self) -> Vec<String> {
        std::fs::read_dir(self.logs.path())
            .expect("Failed to read log dir")
            .filter_map(Result::ok)
            .map(|e| std::fs::read_to_string(e.path()).expect("Failed to read run log"))
            .collect()
    }
}

/// The line the agent is told to print for `task_id` under default config.
pub fn sentinel(task_id: &str) -> String {
    format!("AUTOMATION_COMPLETE: Task {task_id}")
}

/// A side effect observed on the fake work tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Status(String),
    Field(String, String),
    Comment(String),
}

/// URL of the PR every [`FakePullRequests`] hands out.
pub const PR_URL: &str = "https://github.com/acme/widgets/pull/17";

/// In-memory work tracker that records every successful mutation.
pub struct FakePlatform {
    platform: Platform,
    item: Option<WorkItem>,
    /// This mutation fails with an API error and is not recorded.
    fail_on: Option<Call>,
    calls: Mutex<Vec<Call>>,
}

impl FakePlatform {
    pub fn with_item(item: WorkItem) -> Arc<Self> {
        Arc::new(Self {
            platform: item.platform,
            item: Some(item),
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Like [`FakePlatform::with_item`], but `call` is rejected by the API.
    pub fn failing(item: WorkItem, call: Call) -> Arc<Self> {
        Arc::new(Self {
            platform: item.platform,
            item: Some(item),
            fail_on: Some(call),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn empty(platform: Platform) -> Arc<Self> {
        Arc::new(Self {
            platform,
            item: None,
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn comments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Comment(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn fields(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Field(name, value) => Some((name, value)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: Call) -> DomainResult<()> {
        if self.fail_on.as_ref() == Some(&call) {
            return Err(DomainError::PlatformApi(format!("rejected {call:?}")));
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn get_work_item(&self, id: &str) -> DomainResult<WorkItem> {
        match &self.item {
            Some(item) if item.id == id => Ok(item.clone()),
            _ => Err(DomainError::WorkItemNotFound(id.to_string())),
        }
    }

    async fn update_status(&self, _id: &str, status: &str) -> DomainResult<()> {
        self.push(Call::Status(status.to_string()))
    }

    async fn set_custom_field(&self, _id: &str, field_name: &str, value: &str) -> DomainResult<()> {
        self.push(Call::Field(field_name.to_string(), value.to_string()))
    }

    async fn add_comment(&self, _id: &str, text: &str) -> DomainResult<()> {
        self.push(Call::Comment(text.to_string()))
    }
}

/// Pull-request host whose PR for the queried branch appears after a number
/// of empty lookups.
pub struct FakePullRequests {
    age: Option<Duration>,
    appears_after: usize,
    /// How long each lookup takes to answer.
    latency: std::time::Duration,
    lookups: AtomicUsize,
}

impl FakePullRequests {
    /// Never has an open PR.
    pub fn none() -> Arc<Self> {
        Self::after(0, None)
    }

    /// An open PR created `age` ago, visible from the first lookup.
    pub fn aged(age: Duration) -> Arc<Self> {
        Self::after(0, Some(age))
    }

    /// `empty_lookups` lookups find nothing, later ones find a PR `age` old.
    pub fn after(empty_lookups: usize, age: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            age,
            appears_after: empty_lookups,
            latency: std::time::Duration::ZERO,
            lookups: AtomicUsize::new(0),
        })
    }

    /// An open PR created `age` ago that the host takes `latency` to report.
    pub fn slow(age: Duration, latency: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            age: Some(age),
            appears_after: 0,
            latency,
            lookups: AtomicUsize::new(0),
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PullRequestHost for FakePullRequests {
    async fn find_open_pull_request(&self, branch: &str) -> DomainResult<Option<PullRequest>> {
        let seen = self.lookups.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        if seen < self.appears_after {
            return Ok(None);
        }
        Ok(self.age.map(|age| PullRequest {
            url: PR_URL.to_string(),
            branch: branch.to_string(),
            created_at: Utc::now() - age,
        }))
    }
}

/// Orchestrator over a real worktree service and the given fakes.
pub fn orchestrator(
    config: Config,
    platform: Arc<FakePlatform>,
    pull_requests: Arc<FakePullRequests>,
) -> RunOrchestrator {
    let workspaces = Arc::new(WorkspaceService::new(&config.repository));
    let classifier = Arc::new(
        SentinelClassifier::new(
            config.agent.sentinel_prefix.clone(),
            config.reconcile.manual_steps_marker.clone(),
        )
        .expect("valid classifier"),
    );
    RunOrchestrator::new(Arc::new(config), pull_requests, workspaces, classifier)
        .with_platform(platform)
}
