use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration structure for the relay.
///
/// Built once at startup by the config loader and handed to every component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Webhook server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Base repository and worktree layout
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Coding agent subprocess settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Completion reconciliation settings
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// ClickUp credentials and trigger rules
    #[serde(default)]
    pub clickup: ClickUpConfig,

    /// GitHub credentials and trigger rules
    #[serde(default)]
    pub github: GitHubConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Upper bound on simultaneous agent runs. Unbounded when unset.
    #[serde(default)]
    pub max_concurrent_runs: Option<usize>,
}

impl Config {
    /// Copy of the configuration with every credential masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        fn mask(secret: &mut Option<String>) {
            if secret.as_deref().is_some_and(|s| !s.is_empty()) {
                *secret = Some("[REDACTED]".to_string());
            }
        }

        let mut copy = self.clone();
        mask(&mut copy.clickup.api_key);
        mask(&mut copy.clickup.webhook_secret);
        mask(&mut copy.github.token);
        mask(&mut copy.github.webhook_secret);
        for value in copy.agent.env.values_mut() {
            *value = "[REDACTED]".to_string();
        }
        copy
    }
}

/// Webhook server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Base repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepositoryConfig {
    /// Path to the base git repository
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,

    /// Remote that PRs target
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch new work branches start from
    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    /// Directory (relative to the repository unless absolute) holding per-run worktrees
    #[serde(default = "default_worktree_root")]
    pub worktree_root: PathBuf,

    /// Local, untracked files copied into each worktree when present
    #[serde(default = "default_seed_files")]
    pub seed_files: Vec<String>,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_worktree_root() -> PathBuf {
    PathBuf::from(".taskrelay/worktrees")
}

fn default_seed_files() -> Vec<String> {
    vec![
        ".env".to_string(),
        ".mcp.json".to_string(),
        ".claude/settings.local.json".to_string(),
    ]
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
            remote: default_remote(),
            base_branch: default_base_branch(),
            worktree_root: default_worktree_root(),
            seed_files: default_seed_files(),
        }
    }
}

/// Coding agent subprocess configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent executable
    #[serde(default = "default_binary_path")]
    pub binary_path: String,

    /// Arguments passed before the model and tool flags
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,

    /// Model name, omitted from the command line when empty
    #[serde(default = "default_model")]
    pub model: String,

    /// Tool allow-list, omitted from the command line when empty
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,

    /// Wall-clock budget for one run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Time between SIGTERM and SIGKILL
    #[serde(default = "default_kill_grace_secs")]
    pub kill_grace_secs: u64,

    /// Time an agent gets to exit on its own after signalling completion
    #[serde(default = "default_completion_grace_secs")]
    pub completion_grace_secs: u64,

    /// Leading text of the completion line, followed by `: Task <id>`
    #[serde(default = "default_sentinel_prefix")]
    pub sentinel_prefix: String,

    /// Extra environment for the agent process
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_binary_path() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ]
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_allowed_tools() -> Vec<String> {
    ["Bash", "Edit", "Write", "Read", "Glob", "Grep", "MultiEdit", "TodoWrite"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

const fn default_timeout_secs() -> u64 {
    900
}

const fn default_kill_grace_secs() -> u64 {
    10
}

const fn default_completion_grace_secs() -> u64 {
    30
}

fn default_sentinel_prefix() -> String {
    "AUTOMATION_COMPLETE".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            args: default_agent_args(),
            model: default_model(),
            allowed_tools: default_allowed_tools(),
            timeout_secs: default_timeout_secs(),
            kill_grace_secs: default_kill_grace_secs(),
            completion_grace_secs: default_completion_grace_secs(),
            sentinel_prefix: default_sentinel_prefix(),
            env: HashMap::new(),
        }
    }
}

/// Completion reconciliation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconcileConfig {
    /// Maximum age of a PR that may be attributed to the current run
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,

    /// How many times to look for the run's PR
    #[serde(default = "default_pr_lookup_attempts")]
    pub pr_lookup_attempts: u32,

    /// Fixed delay between PR lookups
    #[serde(default = "default_pr_lookup_interval_ms")]
    pub pr_lookup_interval_ms: u64,

    /// Status set when an agent run starts
    #[serde(default = "default_in_progress_status")]
    pub in_progress_status: String,

    /// Status set once a PR is attributed to the run
    #[serde(default = "default_ready_status")]
    pub ready_status: String,

    /// Custom field receiving the branch name
    #[serde(default = "default_branch_field")]
    pub branch_field: String,

    /// Custom field receiving the PR URL
    #[serde(default = "default_pr_url_field")]
    pub pr_url_field: String,

    /// Heading that opens the manual-steps section in agent output
    #[serde(default = "default_manual_steps_marker")]
    pub manual_steps_marker: String,

    /// First line of every automated comment
    #[serde(default = "default_comment_banner")]
    pub comment_banner: String,
}

const fn default_freshness_window_secs() -> u64 {
    600
}

const fn default_pr_lookup_attempts() -> u32 {
    3
}

const fn default_pr_lookup_interval_ms() -> u64 {
    10_000
}

fn default_in_progress_status() -> String {
    "in progress".to_string()
}

fn default_ready_status() -> String {
    "Ready for Review (DEV)".to_string()
}

fn default_branch_field() -> String {
    "GitHub Branch".to_string()
}

fn default_pr_url_field() -> String {
    "GitHub Pull Request URL".to_string()
}

fn default_manual_steps_marker() -> String {
    "## Manual Steps".to_string()
}

fn default_comment_banner() -> String {
    "🤖 Automated update from taskrelay".to_string()
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: default_freshness_window_secs(),
            pr_lookup_attempts: default_pr_lookup_attempts(),
            pr_lookup_interval_ms: default_pr_lookup_interval_ms(),
            in_progress_status: default_in_progress_status(),
            ready_status: default_ready_status(),
            branch_field: default_branch_field(),
            pr_url_field: default_pr_url_field(),
            manual_steps_marker: default_manual_steps_marker(),
            comment_banner: default_comment_banner(),
        }
    }
}

/// ClickUp configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClickUpConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    /// Shared secret expected in the `X-Signature` header
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Only tasks created in this list trigger runs
    #[serde(default)]
    pub list_id: Option<String>,

    /// Comment text that triggers a run
    #[serde(default = "default_trigger_comment")]
    pub trigger_comment: String,

    #[serde(default = "default_clickup_api_base")]
    pub api_base: String,

    #[serde(default = "default_clickup_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_trigger_comment() -> String {
    "adw".to_string()
}

fn default_clickup_api_base() -> String {
    "https://api.clickup.com/api/v2".to_string()
}

const fn default_clickup_requests_per_minute() -> u32 {
    100
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ClickUpConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            webhook_secret: None,
            list_id: None,
            trigger_comment: default_trigger_comment(),
            api_base: default_clickup_api_base(),
            requests_per_minute: default_clickup_requests_per_minute(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// GitHub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: Option<String>,

    /// Repository owner; resolved from the remote URL when unset
    #[serde(default)]
    pub owner: Option<String>,

    /// Repository name; resolved from the remote URL when unset
    #[serde(default)]
    pub repo: Option<String>,

    /// Secret used to verify `X-Hub-Signature-256`
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Comment text that triggers a run
    #[serde(default = "default_trigger_comment")]
    pub trigger_comment: String,

    #[serde(default = "default_github_api_base")]
    pub api_base: String,

    #[serde(default = "default_github_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

const fn default_github_requests_per_minute() -> u32 {
    80
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            webhook_secret: None,
            trigger_comment: default_trigger_comment(),
            api_base: default_github_api_base(),
            requests_per_minute: default_github_requests_per_minute(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling process logs; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rolling file rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Directory for the per-run audit logs
    #[serde(default = "default_run_log_dir")]
    pub run_log_dir: PathBuf,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_run_log_dir() -> PathBuf {
    PathBuf::from(".taskrelay/runs")
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            run_log_dir: default_run_log_dir(),
            retention_days: default_retention_days(),
        }
    }
}
