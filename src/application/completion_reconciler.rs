//! Completion Reconciler
//!
//! Writes the result of a finished run back to its work item:
//!
//! 1. find a fresh open PR for the run's branch (bounded, fixed-interval retries)
//! 2. write the PR URL and branch name to the item's custom fields
//! 3. move the item to the ready-for-review status
//! 4. forward the agent's manual-steps section as a comment
//! 5. release the workspace
//!
//! Steps 2-5 are each best-effort: a failure is logged and recorded in the
//! report, and the next step still runs. Without a fresh PR nothing on the
//! work item is touched. The reconciler does not deduplicate its own side
//! effects; callers gate it behind the run's
//! [`CompletionLatch`](super::CompletionLatch).

use backoff::backoff::Backoff;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::DomainError;
use crate::domain::models::{PullRequest, ReconcileConfig, RunContext};
use crate::domain::ports::{OutputClassifier, PlatformClient, PullRequestHost, WorkspaceProvider};

/// Fixed delay between a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct FixedAttempts {
    interval: Duration,
    attempts: u32,
    remaining: u32,
}

impl FixedAttempts {
    /// `attempts` is the total number of tries, including the first.
    pub fn new(interval: Duration, attempts: u32) -> Self {
        let retries = attempts.saturating_sub(1);
        Self {
            interval,
            attempts: retries,
            remaining: retries,
        }
    }
}

impl Backoff for FixedAttempts {
    fn reset(&mut self) {
        self.remaining = self.attempts;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.interval)
    }
}

/// Why no PR could be attributed to a run.
#[derive(Debug)]
enum LookupMiss {
    NotFound,
    Stale(PullRequest),
    Failed(DomainError),
}

/// Result of the PR lookup for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PrLookup {
    Fresh { pull_request: PullRequest },
    Stale { pull_request: PullRequest },
    NotFound,
    Failed { error: String },
}

impl PrLookup {
    pub fn fresh(&self) -> Option<&PullRequest> {
        match self {
            Self::Fresh { pull_request } => Some(pull_request),
            _ => None,
        }
    }
}

/// What reconciliation did for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// PR attributed to the run, if any.
    pub pull_request: Option<PullRequest>,
    /// Custom fields written successfully.
    pub fields_written: Vec<String>,
    pub status_updated: bool,
    pub manual_steps_posted: bool,
    /// One message per best-effort step that failed.
    pub failures: Vec<String>,
}

impl ReconcileReport {
    /// Whether a PR was attributed and the item was touched.
    pub const fn attributed(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// Performs the side effects of a completed run.
pub struct CompletionReconciler {
    platform: Arc<dyn PlatformClient>,
    pull_requests: Arc<dyn PullRequestHost>,
    workspaces: Arc<dyn WorkspaceProvider>,
    classifier: Arc<dyn OutputClassifier>,
    settings: ReconcileConfig,
}

impl CompletionReconciler {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        pull_requests: Arc<dyn PullRequestHost>,
        workspaces: Arc<dyn WorkspaceProvider>,
        classifier: Arc<dyn OutputClassifier>,
        settings: ReconcileConfig,
    ) -> Self {
        Self {
            platform,
            pull_requests,
            workspaces,
            classifier,
            settings,
        }
    }

    fn freshness_window(&self) -> chrono::Duration {
        let secs = i64::try_from(self.settings.freshness_window_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }

    /// Step 1: look for an open PR on `branch` created within the freshness
    /// window.
    ///
    /// A missing PR or a transient lookup error is retried up to
    /// `pr_lookup_attempts` times, `pr_lookup_interval_ms` apart. A stale PR
    /// ends the search at once: a branch has at most one open PR, so a
    /// fresh one will not appear behind it.
    #[instrument(skip(self))]
    pub async fn find_fresh_pull_request(&self, branch: &str) -> PrLookup {
        let policy = FixedAttempts::new(
            Duration::from_millis(self.settings.pr_lookup_interval_ms),
            self.settings.pr_lookup_attempts.max(1),
        );
        let window = self.freshness_window();

        let lookup = backoff::future::retry(policy, move || async move {
            match self.pull_requests.find_open_pull_request(branch).await {
                Ok(Some(pr)) if pr.is_fresh(Utc::now(), window) => Ok(pr),
                Ok(Some(pr)) => Err(backoff::Error::permanent(LookupMiss::Stale(pr))),
                Ok(None) => {
                    debug!(branch = %branch, "No open PR yet");
                    Err(backoff::Error::transient(LookupMiss::NotFound))
                }
                Err(e) if e.is_transient() => {
                    warn!(branch = %branch, error = %e, "PR lookup failed, will retry");
                    Err(backoff::Error::transient(LookupMiss::Failed(e)))
                }
                Err(e) => Err(backoff::Error::permanent(LookupMiss::Failed(e))),
            }
        })
        .await;

        match lookup {
            Ok(pull_request) => {
                info!(url = %pull_request.url, "Found fresh PR for run");
                PrLookup::Fresh { pull_request }
            }
            Err(LookupMiss::Stale(pull_request)) => {
                warn!(
                    url = %pull_request.url,
                    created_at = %pull_request.created_at,
                    window_secs = self.settings.freshness_window_secs,
                    "Open PR is older than the freshness window, not attributing it to this run"
                );
                PrLookup::Stale { pull_request }
            }
            Err(LookupMiss::NotFound) => {
                warn!(branch = %branch, "No open PR found for branch");
                PrLookup::NotFound
            }
            Err(LookupMiss::Failed(e)) => {
                warn!(branch = %branch, error = %e, "PR lookup failed");
                PrLookup::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Steps 1-4 for a run believed complete.
    ///
    /// Without a fresh PR no work-item mutation happens and an empty report
    /// is returned.
    #[instrument(skip(self, ctx, transcript), fields(task_id = %ctx.task_id, branch = %ctx.branch_name))]
    pub async fn reconcile(&self, ctx: &RunContext, transcript: &str) -> ReconcileReport {
        match self.find_fresh_pull_request(&ctx.branch_name).await {
            PrLookup::Fresh { pull_request } => self.apply(ctx, &pull_request, transcript).await,
            _ => {
                warn!("No completion evidence, leaving work item untouched");
                ReconcileReport::default()
            }
        }
    }

    /// Steps 2-4 given the PR attributed to the run.
    #[instrument(skip(self, ctx, pull_request, transcript), fields(task_id = %ctx.task_id, url = %pull_request.url))]
    pub async fn apply(
        &self,
        ctx: &RunContext,
        pull_request: &PullRequest,
        transcript: &str,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            pull_request: Some(pull_request.clone()),
            ..ReconcileReport::default()
        };

        let fields = [
            (&self.settings.pr_url_field, pull_request.url.as_str()),
            (&self.settings.branch_field, ctx.branch_name.as_str()),
        ];
        for (field, value) in fields {
            match self.platform.set_custom_field(&ctx.task_id, field, value).await {
                Ok(()) => {
                    debug!(field = %field, "Custom field written");
                    report.fields_written.push(field.clone());
                }
                Err(e) => {
                    warn!(field = %field, error = %e, "Failed to write custom field");
                    report.failures.push(format!("set field '{field}': {e}"));
                }
            }
        }

        match self
            .platform
            .update_status(&ctx.task_id, &self.settings.ready_status)
            .await
        {
            Ok(()) => {
                info!(status = %self.settings.ready_status, "Work item moved to review");
                report.status_updated = true;
            }
            Err(e) => {
                warn!(error = %e, "Failed to update work item status");
                report.failures.push(format!("update status: {e}"));
            }
        }

        if let Some(note) = self.classifier.extract_manual_steps(transcript) {
            let comment = format!(
                "{}\n\n{}\n\n{}",
                self.settings.comment_banner,
                self.settings.manual_steps_marker,
                note.as_str()
            );
            match self.platform.add_comment(&ctx.task_id, &comment).await {
                Ok(()) => {
                    info!("Manual steps posted");
                    report.manual_steps_posted = true;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to post manual steps");
                    report.failures.push(format!("post manual steps: {e}"));
                }
            }
        } else {
            debug!("No manual steps in agent output");
        }

        report
    }

    /// Step 5: remove the run's workspace. Failures are logged, not retried.
    #[instrument(skip(self, ctx), fields(task_id = %ctx.task_id, path = %ctx.workspace_path.display()))]
    pub async fn release_workspace(&self, ctx: &RunContext) -> bool {
        match self.workspaces.release(&ctx.workspace_path).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to release workspace");
                false
            }
        }
    }
}
