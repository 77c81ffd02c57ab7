//! Builds the run pipeline from a loaded [`Config`].

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::plugins::{
    clickup_platform, github_adapters, github_client, UnconfiguredPullRequests,
};
use crate::application::RunOrchestrator;
use crate::domain::models::Config;
use crate::domain::ports::PullRequestHost;
use crate::services::{SentinelClassifier, WorkspaceService};

/// Everything a command needs to start runs.
pub struct Relay {
    pub config: Arc<Config>,
    pub workspaces: Arc<WorkspaceService>,
    pub orchestrator: Arc<RunOrchestrator>,
}

impl Relay {
    /// Wire platform clients, the PR host, the workspace service and the
    /// output classifier into an orchestrator.
    ///
    /// A missing GitHub owner or repo is filled in from the repository's
    /// remote URL.
    pub async fn build(mut config: Config) -> Result<Self> {
        let workspaces = Arc::new(WorkspaceService::new(&config.repository));

        if config.github.owner.is_none() || config.github.repo.is_none() {
            if let Some((owner, repo)) = workspaces.remote_slug().await {
                info!(owner = %owner, repo = %repo, "Resolved GitHub repository from remote");
                if config.github.owner.is_none() {
                    config.github.owner = Some(owner);
                }
                if config.github.repo.is_none() {
                    config.github.repo = Some(repo);
                }
            }
        }

        let classifier = Arc::new(
            SentinelClassifier::new(
                config.agent.sentinel_prefix.clone(),
                config.reconcile.manual_steps_marker.clone(),
            )
            .context("Invalid output classifier settings")?,
        );

        let github = github_client(&config);
        let pull_requests: Arc<dyn PullRequestHost> = match &github {
            Some(client) => Arc::new(github_adapters(client).1),
            None => {
                warn!("GitHub is not configured; pull requests cannot be attributed to runs");
                Arc::new(UnconfiguredPullRequests)
            }
        };

        let config = Arc::new(config);
        let mut orchestrator = RunOrchestrator::new(
            Arc::clone(&config),
            pull_requests,
            workspaces.clone(),
            classifier,
        );
        if let Some(clickup) = clickup_platform(&config) {
            orchestrator = orchestrator.with_platform(Arc::new(clickup));
        }
        if let Some(client) = &github {
            orchestrator = orchestrator.with_platform(Arc::new(github_adapters(client).0));
        }

        Ok(Self {
            config,
            workspaces,
            orchestrator: Arc::new(orchestrator),
        })
    }
}
