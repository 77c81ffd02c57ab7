//! Implementation of the `taskrelay health` command.
//!
//! Checks run concurrently; any failed check makes the command exit non-zero.
//! Warnings are reported but do not fail the command.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::process::Command;

use crate::cli::output::{list_table, output, truncate, CommandOutput};
use crate::cli::Relay;
use crate::domain::models::{Config, Platform};

const AGENT_VERSION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlatformSelection {
    Clickup,
    Github,
    Both,
}

impl PlatformSelection {
    fn includes(self, platform: Platform) -> bool {
        matches!(
            (self, platform),
            (Self::Both, _) | (Self::Clickup, Platform::ClickUp) | (Self::Github, Platform::GitHub)
        )
    }
}

#[derive(Args, Debug)]
pub struct HealthArgs {
    /// Platform(s) whose credentials are required
    #[arg(long, short, value_enum, default_value = "both")]
    pub platform: PlatformSelection,

    /// Fetch this task from each selected platform to prove API access
    #[arg(long)]
    pub probe_task: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warn,
    Fail,
}

impl CheckStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "FAIL",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn new(name: impl Into<String>, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthOutput {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub checks: Vec<CheckResult>,
}

impl CommandOutput for HealthOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["check", "status", "detail"]);
        for check in &self.checks {
            table.add_row(vec![
                check.name.clone(),
                check.status.as_str().to_string(),
                truncate(&check.detail, 80),
            ]);
        }
        let verdict = if self.success { "healthy" } else { "unhealthy" };
        format!("{table}\n\nSystem is {verdict}")
    }
}

type CheckFuture<'a> = Pin<Box<dyn Future<Output = CheckResult> + Send + 'a>>;

pub async fn execute(args: HealthArgs, config: Config, json_mode: bool) -> Result<()> {
    let relay = Relay::build(config).await?;
    let result = run_checks(&args, &relay).await;
    let success = result.success;
    output(&result, json_mode);

    if !success {
        anyhow::bail!("Health check failed");
    }
    Ok(())
}

pub async fn run_checks(args: &HealthArgs, relay: &Relay) -> HealthOutput {
    let config = relay.config.as_ref();
    let mut checks: Vec<CheckResult> = Vec::new();

    if args.platform.includes(Platform::ClickUp) {
        checks.push(clickup_credentials(config));
    }
    checks.push(github_credentials(config, args.platform.includes(Platform::GitHub)));
    checks.push(concurrency_limit(config));

    let mut pending: Vec<CheckFuture<'_>> = Vec::new();
    pending.push(Box::pin(agent_binary(&config.agent.binary_path)));
    pending.push(Box::pin(git_repository(relay)));
    if let Some(task_id) = args.probe_task.as_deref() {
        for platform in [Platform::ClickUp, Platform::GitHub] {
            if args.platform.includes(platform) {
                pending.push(Box::pin(probe_task(relay, platform, task_id)));
            }
        }
    }
    checks.extend(join_all(pending).await);

    HealthOutput {
        success: checks.iter().all(|c| c.status != CheckStatus::Fail),
        timestamp: Utc::now(),
        checks,
    }
}

fn is_set(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn clickup_credentials(config: &Config) -> CheckResult {
    let name = "clickup credentials";
    if !is_set(config.clickup.api_key.as_ref()) {
        return CheckResult::new(name, CheckStatus::Fail, "CLICKUP_API_KEY is not set");
    }
    if !is_set(config.clickup.webhook_secret.as_ref()) {
        return CheckResult::new(
            name,
            CheckStatus::Warn,
            "CLICKUP_WEBHOOK_SECRET is not set; webhook signatures will not be checked",
        );
    }
    let detail = match &config.clickup.list_id {
        Some(list) => format!("api key and webhook secret set, list {list}"),
        None => "api key and webhook secret set".to_string(),
    };
    CheckResult::new(name, CheckStatus::Ok, detail)
}

/// A token is required to serve GitHub issues. Without one ClickUp runs
/// still work, but no PR can be attributed to them.
fn github_credentials(config: &Config, required: bool) -> CheckResult {
    let name = "github credentials";
    let missing = if required {
        CheckStatus::Fail
    } else {
        CheckStatus::Warn
    };
    if !is_set(config.github.token.as_ref()) {
        return CheckResult::new(
            name,
            missing,
            "GITHUB_TOKEN is not set; pull requests cannot be attributed to runs",
        );
    }
    let (Some(owner), Some(repo)) = (&config.github.owner, &config.github.repo) else {
        return CheckResult::new(
            name,
            missing,
            "repository owner/name not configured and not derivable from the remote",
        );
    };
    if required && !is_set(config.github.webhook_secret.as_ref()) {
        return CheckResult::new(
            name,
            CheckStatus::Warn,
            format!("{owner}/{repo}; GITHUB_WEBHOOK_SECRET is not set"),
        );
    }
    CheckResult::new(name, CheckStatus::Ok, format!("{owner}/{repo}"))
}

fn concurrency_limit(config: &Config) -> CheckResult {
    match config.max_concurrent_runs {
        Some(limit) => CheckResult::new(
            "concurrency",
            CheckStatus::Ok,
            format!("at most {limit} simultaneous runs"),
        ),
        None => CheckResult::new(
            "concurrency",
            CheckStatus::Warn,
            "max_concurrent_runs is unset; every trigger starts an agent immediately",
        ),
    }
}

async fn agent_binary(binary: &str) -> CheckResult {
    let name = "agent binary";
    let mut cmd = Command::new(binary);
    cmd.arg("--version").kill_on_drop(true);
    match tokio::time::timeout(AGENT_VERSION_TIMEOUT, cmd.output()).await {
        Err(_) => CheckResult::new(
            name,
            CheckStatus::Fail,
            format!("'{binary} --version' timed out"),
        ),
        Ok(Err(e)) => CheckResult::new(
            name,
            CheckStatus::Fail,
            format!("'{binary}' could not be started: {e}"),
        ),
        Ok(Ok(out)) if !out.status.success() => CheckResult::new(
            name,
            CheckStatus::Fail,
            format!("'{binary} --version' exited with {}", out.status),
        ),
        Ok(Ok(out)) => {
            let version = String::from_utf8_lossy(&out.stdout).trim().to_string();
            CheckResult::new(name, CheckStatus::Ok, format!("{binary} {version}"))
        }
    }
}

async fn git_repository(relay: &Relay) -> CheckResult {
    let config = &relay.config.repository;
    match relay.workspaces.check_repository().await {
        Ok(()) => CheckResult::new(
            "git repository",
            CheckStatus::Ok,
            format!(
                "{} (base {}/{})",
                config.path.display(),
                config.remote,
                config.base_branch
            ),
        ),
        Err(e) => CheckResult::new("git repository", CheckStatus::Fail, e.to_string()),
    }
}

async fn probe_task(relay: &Relay, platform: Platform, task_id: &str) -> CheckResult {
    let name = format!("{platform} api");
    let Some(client) = relay.orchestrator.platform(platform) else {
        return CheckResult::new(name, CheckStatus::Fail, format!("{platform} is not configured"));
    };
    match client.get_work_item(task_id).await {
        Ok(item) => CheckResult::new(
            name,
            CheckStatus::Ok,
            format!("fetched {}: {}", item.id, item.title),
        ),
        Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string()),
    }
}
