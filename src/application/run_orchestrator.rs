//! Run Orchestrator
//!
//! Turns a trigger (platform + task id) into a complete agent run:
//! fetch the work item, classify it, provision a workspace, open the run log,
//! mark the item in progress, and hand over to the [`AgentRunController`].
//!
//! Failing to fetch the item or create the workspace aborts the run before
//! any agent is launched and before the work item is touched.

use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::agent_run_controller::{AgentRunController, RunOutcome};
use super::completion_reconciler::CompletionReconciler;
use crate::domain::errors::DomainError;
use crate::domain::models::{Config, Platform, RunContext};
use crate::domain::ports::{OutputClassifier, PlatformClient, PullRequestHost, WorkspaceProvider};
use crate::services::prompt::{build_prompt, PromptInputs};
use crate::services::run_log::RunLog;
use crate::services::task_classifier::{branch_name, classify_work_item};

/// A request to run the agent for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTrigger {
    /// Id the run will carry, known before it starts.
    pub run_id: Uuid,
    pub platform: Platform,
    pub task_id: String,
    /// Where the trigger came from, e.g. `clickup:taskCreated` or `cli`.
    pub source: String,
}

impl RunTrigger {
    pub fn new(platform: Platform, task_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            platform,
            task_id: task_id.into(),
            source: source.into(),
        }
    }
}

/// Setup failures that prevent a run from starting.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("No client configured for platform {0}")]
    PlatformNotConfigured(Platform),

    #[error("Failed to fetch work item {task_id}: {source}")]
    WorkItemFetch { task_id: String, source: DomainError },

    #[error("Failed to provision workspace for {branch}: {source}")]
    Workspace { branch: String, source: DomainError },

    #[error("Failed to open run log: {0}")]
    RunLog(DomainError),

    #[error("Failed to launch agent: {0}")]
    AgentLaunch(DomainError),
}

/// Wires triggers to agent runs.
pub struct RunOrchestrator {
    config: Arc<Config>,
    platforms: HashMap<Platform, Arc<dyn PlatformClient>>,
    pull_requests: Arc<dyn PullRequestHost>,
    workspaces: Arc<dyn WorkspaceProvider>,
    classifier: Arc<dyn OutputClassifier>,
    run_slots: Option<Arc<Semaphore>>,
}

impl RunOrchestrator {
    pub fn new(
        config: Arc<Config>,
        pull_requests: Arc<dyn PullRequestHost>,
        workspaces: Arc<dyn WorkspaceProvider>,
        classifier: Arc<dyn OutputClassifier>,
    ) -> Self {
        let run_slots = config
            .max_concurrent_runs
            .map(|limit| Arc::new(Semaphore::new(limit)));
        Self {
            config,
            platforms: HashMap::new(),
            pull_requests,
            workspaces,
            classifier,
            run_slots,
        }
    }

    /// Register the client for a platform.
    #[must_use]
    pub fn with_platform(mut self, client: Arc<dyn PlatformClient>) -> Self {
        self.platforms.insert(client.platform(), client);
        self
    }

    pub fn supports(&self, platform: Platform) -> bool {
        self.platforms.contains_key(&platform)
    }

    /// The client registered for `platform`.
    pub fn platform(&self, platform: Platform) -> Option<Arc<dyn PlatformClient>> {
        self.platforms.get(&platform).cloned()
    }

    /// Run `trigger` in the background, logging the outcome.
    pub fn spawn(self: &Arc<Self>, trigger: RunTrigger) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let task_id = trigger.task_id.clone();
            match orchestrator.handle(trigger).await {
                Ok(outcome) => info!(
                    task_id = %task_id,
                    state = %outcome.state,
                    signal = outcome.signal.as_ref().map(|s| s.kind()),
                    "Run complete"
                ),
                Err(e) => error!(task_id = %task_id, error = %e, "Run aborted"),
            }
        })
    }

    /// Run the full pipeline for one trigger and wait for it to finish.
    #[instrument(skip(self, trigger), fields(run_id = %trigger.run_id, platform = %trigger.platform, task_id = %trigger.task_id, source = %trigger.source))]
    pub async fn handle(&self, trigger: RunTrigger) -> Result<RunOutcome, RunError> {
        let platform = self
            .platforms
            .get(&trigger.platform)
            .cloned()
            .ok_or(RunError::PlatformNotConfigured(trigger.platform))?;

        let work_item = platform
            .get_work_item(&trigger.task_id)
            .await
            .map_err(|source| RunError::WorkItemFetch {
                task_id: trigger.task_id.clone(),
                source,
            })?;

        let task_type = classify_work_item(&work_item);
        let branch = branch_name(&work_item.id, task_type, &work_item.title);
        info!(task_type = %task_type, branch = %branch, title = %work_item.title, "Work item classified");

        let _slot = match &self.run_slots {
            Some(slots) => {
                if slots.available_permits() == 0 {
                    info!("All run slots busy, waiting");
                }
                Arc::clone(slots).acquire_owned().await.ok()
            }
            None => None,
        };

        let workspace_path = self
            .workspaces
            .provision(&branch)
            .await
            .map_err(|source| RunError::Workspace {
                branch: branch.clone(),
                source,
            })?;

        let started_at = Utc::now();
        let log = match RunLog::create(&self.config.logging.run_log_dir, &work_item.id, started_at) {
            Ok(log) => log,
            Err(e) => {
                self.release_after_abort(&workspace_path).await;
                return Err(RunError::RunLog(e));
            }
        };

        let ctx = RunContext {
            run_id: trigger.run_id,
            task_id: work_item.id.clone(),
            work_item,
            task_type,
            branch_name: branch,
            workspace_path,
            started_at,
            log_path: log.path().to_path_buf(),
        };
        info!(run_id = %ctx.run_id, log = %ctx.log_path.display(), "Run started");
        if let Err(e) = log.record(
            "run_started",
            json!({
                "run_id": ctx.run_id,
                "task_id": ctx.task_id,
                "platform": trigger.platform,
                "source": trigger.source,
                "branch": ctx.branch_name,
                "workspace": ctx.workspace_path,
            }),
        ) {
            warn!(error = %e, "Failed to write run log");
        }

        let reconcile = &self.config.reconcile;
        if let Err(e) = platform
            .update_status(&ctx.task_id, &reconcile.in_progress_status)
            .await
        {
            warn!(error = %e, status = %reconcile.in_progress_status, "Failed to mark work item in progress");
        }

        let reconciler = Arc::new(CompletionReconciler::new(
            platform,
            Arc::clone(&self.pull_requests),
            Arc::clone(&self.workspaces),
            Arc::clone(&self.classifier),
            reconcile.clone(),
        ));
        let mut controller = AgentRunController::new(
            self.config.agent.clone(),
            Arc::clone(&self.classifier),
            reconciler,
        );
        if let Some(token) = self.config.github.token.as_deref().filter(|t| !t.is_empty()) {
            controller = controller.with_env("GH_TOKEN", token);
        }

        let sentinel = format!("{}: Task {}", self.config.agent.sentinel_prefix, ctx.task_id);
        let prompt = build_prompt(&PromptInputs {
            work_item: &ctx.work_item,
            task_type,
            branch: &ctx.branch_name,
            base_branch: &self.config.repository.base_branch,
            sentinel: &sentinel,
            manual_steps_marker: &reconcile.manual_steps_marker,
        });

        match controller.run(&ctx, &prompt, &log).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(error = %e, "Agent could not be launched");
                self.release_after_abort(&ctx.workspace_path).await;
                Err(RunError::AgentLaunch(e))
            }
        }
    }

    async fn release_after_abort(&self, path: &std::path::Path) {
        if let Err(e) = self.workspaces.release(path).await {
            error!(error = %e, path = %path.display(), "Failed to release workspace after aborted run");
        }
    }
}
