//! Agent Run Controller
//!
//! Launches the coding agent in a run's workspace and drives the run state
//! machine:
//!
//! ```text
//! Idle -> Launched -> Streaming -> { Completed | TimedOut | Crashed }
//! ```
//!
//! Every output line is appended to the run log and offered to the
//! [`OutputClassifier`]. Only stdout contributes to the transcript; stderr is
//! checked for completion signals but otherwise treated as diagnostics.
//!
//! The first completion signal claims the run's [`CompletionLatch`] and
//! starts reconciliation on its own task. The controller keeps watching the
//! process meanwhile, so the wall-clock deadline and the termination
//! escalation hold even while PR lookups or platform calls are slow. If the
//! process exits (or is timed out) with the latch still open, a clean,
//! timed-out or killed exit falls back to looking for a fresh PR as external
//! evidence; any other exit is a crash. The workspace is released exactly
//! once, after the process is gone and reconciliation has finished.

use serde::Serialize;
use serde_json::json;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;

use super::completion_latch::CompletionLatch;
use super::completion_reconciler::{CompletionReconciler, PrLookup, ReconcileReport};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentConfig, AgentExit, CompletionSignal, RunContext, RunState};
use crate::domain::ports::OutputClassifier;
use crate::services::run_log::{OutputStream, RunLog};

/// How long to keep reading buffered output once the process has exited.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Final result of one agent run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub task_id: String,
    pub branch: String,
    pub state: RunState,
    /// Signal that resolved the run, if any.
    pub signal: Option<CompletionSignal>,
    pub exit: Option<AgentExit>,
    /// Reconciliation result; absent when nothing was reconciled.
    pub report: Option<ReconcileReport>,
    pub workspace_released: bool,
}

/// Mutable state threaded through one run.
struct RunProgress {
    state: RunState,
    latch: CompletionLatch,
    transcript: String,
    signal: Option<CompletionSignal>,
    report: Option<ReconcileReport>,
    /// Reconciliation started by an explicit signal, still in flight.
    reconciling: Option<JoinHandle<ReconcileReport>>,
    /// Transcript length when the explicit signal arrived.
    signalled_at: Option<usize>,
}

impl RunProgress {
    fn new() -> Self {
        Self {
            state: RunState::Idle,
            latch: CompletionLatch::new(),
            transcript: String::new(),
            signal: None,
            report: None,
            reconciling: None,
            signalled_at: None,
        }
    }

    fn transition(&mut self, next: RunState, log: &RunLog) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Ignoring invalid run state transition");
            return;
        }
        debug!(from = %self.state, to = %next, "Run state transition");
        if let Err(e) = log.record("state", json!({"from": self.state, "to": next})) {
            warn!(error = %e, "Failed to write run log");
        }
        self.state = next;
    }
}

/// Runs the coding agent for a prepared [`RunContext`].
pub struct AgentRunController {
    agent: AgentConfig,
    extra_env: Vec<(String, String)>,
    classifier: Arc<dyn OutputClassifier>,
    reconciler: Arc<CompletionReconciler>,
}

impl AgentRunController {
    pub fn new(
        agent: AgentConfig,
        classifier: Arc<dyn OutputClassifier>,
        reconciler: Arc<CompletionReconciler>,
    ) -> Self {
        Self {
            agent,
            extra_env: Vec::new(),
            classifier,
            reconciler,
        }
    }

    /// Add an environment variable for every agent process, e.g. a host token.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }

    /// Command-line arguments for the agent.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.agent.args.clone();
        if !self.agent.model.is_empty() {
            args.push("--model".to_string());
            args.push(self.agent.model.clone());
        }
        if !self.agent.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.agent.allowed_tools.join(","));
        }
        args
    }

    fn spawn(&self, ctx: &RunContext) -> DomainResult<Child> {
        let mut cmd = Command::new(&self.agent.binary_path);
        cmd.args(self.build_args())
            .current_dir(&ctx.workspace_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        for (key, value) in self.agent.env.iter().chain(self.extra_env.iter().map(|(k, v)| (k, v))) {
            cmd.env(key, value);
        }
        cmd.env("TASKRELAY_TASK_ID", &ctx.task_id)
            .env("TASKRELAY_RUN_ID", ctx.run_id.to_string())
            .env("TASKRELAY_BRANCH", &ctx.branch_name);

        cmd.spawn().map_err(|e| {
            DomainError::AgentSpawn(format!("failed to spawn {}: {e}", self.agent.binary_path))
        })
    }

    /// Run the agent to a terminal state.
    ///
    /// Only a spawn failure is returned as an error; the caller still owns
    /// the workspace in that case. Every other path ends with the workspace
    /// released and a [`RunOutcome`].
    #[instrument(skip(self, ctx, prompt, log), fields(task_id = %ctx.task_id, run_id = %ctx.run_id, branch = %ctx.branch_name))]
    pub async fn run(&self, ctx: &RunContext, prompt: &str, log: &RunLog) -> DomainResult<RunOutcome> {
        let mut progress = RunProgress::new();
        let mut child = self.spawn(ctx)?;
        let deadline = Instant::now() + Duration::from_secs(self.agent.timeout_secs);

        progress.transition(RunState::Launched, log);
        info!(pid = ?child.id(), timeout_secs = self.agent.timeout_secs, "Agent launched");
        record(log, "launched", json!({"pid": child.id(), "args": self.build_args()}));

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    debug!(error = %e, "Agent did not read the full prompt");
                }
                let _ = stdin.shutdown().await;
            });
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, OutputStream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, OutputStream::Stderr, tx.clone());
        }
        drop(tx);

        let mut streams_open = true;
        let mut status: Option<ExitStatus> = None;
        let mut timed_out = false;

        while !progress.latch.is_fired() {
            tokio::select! {
                line = rx.recv(), if streams_open => match line {
                    Some((stream, line)) => self.handle_line(ctx, log, &mut progress, stream, &line),
                    None => streams_open = false,
                },
                waited = child.wait() => {
                    status = waited.ok();
                    break;
                }
                () = tokio::time::sleep_until(deadline) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if progress.latch.is_fired() {
            // Give the agent a chance to wrap up on its own before the deadline.
            let grace = Duration::from_secs(self.agent.completion_grace_secs)
                .min(deadline.saturating_duration_since(Instant::now()));
            status = self.wait_for_exit(ctx, log, &mut progress, &mut child, &mut rx, grace).await;
        } else if status.is_some() {
            self.drain(ctx, log, &mut progress, &mut rx).await;
        }

        if status.is_none() {
            if !progress.latch.is_fired() {
                timed_out = true;
                warn!(timeout_secs = self.agent.timeout_secs, "Agent timed out");
                record(log, "timeout", json!({"timeout_secs": self.agent.timeout_secs}));
            }
            status = self.terminate(ctx, log, &mut progress, &mut child, &mut rx).await;
        }

        let exit = agent_exit(status, timed_out);
        info!(exit = %exit, "Agent exited");
        record(log, "exit", json!({"code": exit.code, "signal": exit.signal, "timed_out": exit.timed_out}));

        if let Some(reconciling) = progress.reconciling.take() {
            debug!("Waiting for reconciliation to finish");
            match reconciling.await {
                Ok(report) => {
                    record(log, "reconciled", json!({"report": report}));
                    progress.report = Some(report);
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation task failed");
                    record(log, "reconcile_failed", json!({"error": e.to_string()}));
                }
            }
            self.warn_on_late_manual_steps(log, &progress);
        } else if !progress.latch.is_fired() {
            self.handle_unsignalled_exit(ctx, log, &mut progress, exit).await;
        }

        let workspace_released = self.reconciler.release_workspace(ctx).await;
        record(
            log,
            "finished",
            json!({"state": progress.state, "workspace_released": workspace_released}),
        );
        info!(state = %progress.state, workspace_released, "Run finished");

        Ok(RunOutcome {
            run_id: ctx.run_id,
            task_id: ctx.task_id.clone(),
            branch: ctx.branch_name.clone(),
            state: progress.state,
            signal: progress.signal,
            exit: Some(exit),
            report: progress.report,
            workspace_released,
        })
    }

    /// Log, accumulate and classify one output line. Starts reconciliation
    /// if the line completes the run and the latch is still open.
    fn handle_line(
        &self,
        ctx: &RunContext,
        log: &RunLog,
        progress: &mut RunProgress,
        stream: OutputStream,
        line: &str,
    ) {
        if progress.state == RunState::Launched {
            progress.transition(RunState::Streaming, log);
        }
        if let Err(e) = log.append_output(stream, line) {
            warn!(error = %e, "Failed to append agent output to run log");
        }

        if stream == OutputStream::Stdout {
            if let Some(text) = self.classifier.transcript_text(line) {
                progress.transcript.push_str(&text);
                progress.transcript.push('\n');
            }
        } else {
            debug!(line = %line, "agent stderr");
        }

        if progress.latch.is_fired() {
            return;
        }
        let Some(signal) = self.classifier.classify(line, &ctx.task_id) else {
            return;
        };
        if !progress.latch.try_fire() {
            return;
        }

        info!(kind = signal.kind(), ?stream, "Completion signal detected");
        record(log, "completion_signal", json!({"signal": signal}));
        progress.transition(RunState::Completed, log);
        progress.signal = Some(signal);

        progress.signalled_at = Some(progress.transcript.len());
        let reconciler = Arc::clone(&self.reconciler);
        let ctx = ctx.clone();
        let transcript = progress.transcript.clone();
        progress.reconciling = Some(tokio::spawn(async move {
            reconciler.reconcile(&ctx, &transcript).await
        }));
    }

    /// Reconciliation only sees output up to the completion line, so a
    /// manual-steps section printed after it never reaches the task.
    fn warn_on_late_manual_steps(&self, log: &RunLog, progress: &RunProgress) {
        let Some(late) = progress
            .signalled_at
            .and_then(|at| progress.transcript.get(at..))
        else {
            return;
        };
        if let Some(note) = self.classifier.extract_manual_steps(late) {
            warn!("Manual steps were printed after the completion line and were not posted");
            record(log, "late_manual_steps", json!({"text": note.as_str()}));
        }
    }

    /// Keep consuming output until the process exits or `limit` passes.
    async fn wait_for_exit(
        &self,
        ctx: &RunContext,
        log: &RunLog,
        progress: &mut RunProgress,
        child: &mut Child,
        rx: &mut mpsc::UnboundedReceiver<(OutputStream, String)>,
        limit: Duration,
    ) -> Option<ExitStatus> {
        let until = Instant::now() + limit;
        let mut streams_open = true;
        let status = loop {
            tokio::select! {
                line = rx.recv(), if streams_open => match line {
                    Some((stream, line)) => self.handle_line(ctx, log, progress, stream, &line),
                    None => streams_open = false,
                },
                waited = child.wait() => break waited.ok(),
                () = tokio::time::sleep_until(until) => return None,
            }
        };
        self.drain(ctx, log, progress, rx).await;
        status
    }

    /// Read whatever output is still buffered after the process exited.
    async fn drain(
        &self,
        ctx: &RunContext,
        log: &RunLog,
        progress: &mut RunProgress,
        rx: &mut mpsc::UnboundedReceiver<(OutputStream, String)>,
    ) {
        let until = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
        loop {
            tokio::select! {
                line = rx.recv() => match line {
                    Some((stream, line)) => self.handle_line(ctx, log, progress, stream, &line),
                    None => return,
                },
                () = tokio::time::sleep_until(until) => {
                    debug!("Output streams still open after exit, giving up on the rest");
                    return;
                }
            }
        }
    }

    /// SIGTERM the agent's process group, then SIGKILL after the grace period.
    async fn terminate(
        &self,
        ctx: &RunContext,
        log: &RunLog,
        progress: &mut RunProgress,
        child: &mut Child,
        rx: &mut mpsc::UnboundedReceiver<(OutputStream, String)>,
    ) -> Option<ExitStatus> {
        let grace = Duration::from_secs(self.agent.kill_grace_secs);
        if signal_group(child, Signal::SIGTERM) {
            info!(grace_secs = self.agent.kill_grace_secs, "Sent SIGTERM to agent");
            record(log, "terminate", json!({"signal": "SIGTERM"}));
            if let Some(status) = self.wait_for_exit(ctx, log, progress, child, rx, grace).await {
                return Some(status);
            }
        }

        warn!("Agent still running, sending SIGKILL");
        record(log, "terminate", json!({"signal": "SIGKILL"}));
        signal_group(child, Signal::SIGKILL);
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "start_kill failed, process likely gone");
        }
        let status = match child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                error!(error = %e, "Failed to reap agent process");
                None
            }
        };
        self.drain(ctx, log, progress, rx).await;
        status
    }

    /// Exit without an explicit signal: look for external evidence when the
    /// exit may hide a success, otherwise record a crash.
    async fn handle_unsignalled_exit(
        &self,
        ctx: &RunContext,
        log: &RunLog,
        progress: &mut RunProgress,
        exit: AgentExit,
    ) {
        let fallback = if exit.timed_out {
            RunState::TimedOut
        } else {
            RunState::Crashed
        };

        if !exit.is_possibly_successful() {
            error!(exit = %exit, "Agent failed without completion evidence");
            progress.transition(fallback, log);
            return;
        }

        info!(exit = %exit, "Ambiguous exit, checking for external evidence");
        let lookup = self.reconciler.find_fresh_pull_request(&ctx.branch_name).await;
        record(log, "pr_lookup", json!({"lookup": lookup}));

        let PrLookup::Fresh { pull_request } = lookup else {
            warn!(exit = %exit, "No completion evidence after exit");
            progress.transition(fallback, log);
            return;
        };
        if !progress.latch.try_fire() {
            return;
        }

        let signal = CompletionSignal::ExternalEvidence;
        info!(kind = signal.kind(), url = %pull_request.url, "Completion inferred from open PR");
        record(log, "completion_signal", json!({"signal": signal}));
        progress.transition(RunState::Completed, log);
        progress.signal = Some(signal);

        let report = self
            .reconciler
            .apply(ctx, &pull_request, &progress.transcript)
            .await;
        record(log, "reconciled", json!({"report": report}));
        progress.report = Some(report);
    }
}

fn record(log: &RunLog, event: &str, fields: serde_json::Value) {
    if let Err(e) = log.record(event, fields) {
        warn!(event, error = %e, "Failed to write run log");
    }
}

/// Forward each line of `reader` to `tx` until EOF.
fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<(OutputStream, String)>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(?stream, error = %e, "Failed to read agent output");
                    break;
                }
            }
        }
    });
}

/// Signal the agent's process group. Returns `false` if it is already gone.
fn signal_group(child: &Child, signal: Signal) -> bool {
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match killpg(Pid::from_raw(pid), signal) {
        Ok(()) => true,
        Err(e) => {
            debug!(pid, ?signal, error = %e, "Failed to signal agent process group");
            false
        }
    }
}

fn agent_exit(status: Option<ExitStatus>, timed_out: bool) -> AgentExit {
    AgentExit {
        code: status.and_then(|s| s.code()),
        signal: status.and_then(|s| s.signal()),
        timed_out,
    }
}
