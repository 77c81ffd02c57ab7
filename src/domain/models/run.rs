//! Run-scoped state: the context of one automation run, its lifecycle
//! states, and the completion signals that can resolve it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use super::task_type::TaskType;
use super::work_item::WorkItem;

/// Everything one automation run needs, created when a trigger resolves to a
/// task and dropped once reconciliation has released the workspace.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub task_id: String,
    pub work_item: WorkItem,
    pub task_type: TaskType,
    /// Derived `{taskId}/{taskType}/{slug}` branch name.
    pub branch_name: String,
    /// Worktree owned exclusively by this run.
    pub workspace_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub log_path: PathBuf,
}

/// Lifecycle of an agent run.
///
/// `Idle → Launched → Streaming → {Completed | TimedOut | Crashed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Launched,
    Streaming,
    Completed,
    TimedOut,
    Crashed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Launched => "launched",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Crashed => "crashed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Crashed)
    }

    /// Whether moving to `next` is a legal step of the run state machine.
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Launched)
                | (Self::Launched, Self::Streaming)
                | (
                    Self::Launched | Self::Streaming,
                    Self::Completed | Self::TimedOut | Self::Crashed
                )
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by a terminal structured result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    Error,
}

impl ResultSubtype {
    /// Agents report `success` or one of several `error_*` subtypes.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("success") {
            Self::Success
        } else {
            Self::Error
        }
    }
}

/// The evidence that resolved a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CompletionSignal {
    /// The agent printed the literal sentinel line.
    ExplicitMarker { payload: String },
    /// The agent emitted a terminal result record carrying the sentinel.
    StructuredResult {
        subtype: ResultSubtype,
        raw: serde_json::Value,
    },
    /// No explicit signal; a fresh open PR for the branch was found.
    ExternalEvidence,
}

impl CompletionSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExplicitMarker { .. } => "explicit-marker",
            Self::StructuredResult { .. } => "structured-result",
            Self::ExternalEvidence => "external-evidence",
        }
    }
}

/// Free-text "manual steps" block lifted verbatim from agent output.
///
/// Forwarded as a comment and never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualStepsNote(pub String);

impl ManualStepsNote {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How the agent process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentExit {
    /// Exit code, absent when the process died from a signal.
    pub code: Option<i32>,
    /// Terminating signal number on Unix.
    pub signal: Option<i32>,
    /// Whether the controller's wall-clock timeout fired first.
    pub timed_out: bool,
}

/// Conventional exit codes for timeout(1), SIGKILL and SIGTERM.
const TIMEOUT_EXIT: i32 = 124;
const SIGKILL_EXIT: i32 = 137;
const SIGTERM_EXIT: i32 = 143;
const SIGKILL: i32 = 9;
const SIGTERM: i32 = 15;

impl AgentExit {
    pub const fn code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
            timed_out: false,
        }
    }

    /// Clean exit, timeout or kill: the agent may have finished its
    /// externally visible work before being cut off.
    pub const fn is_possibly_successful(&self) -> bool {
        if self.timed_out {
            return true;
        }
        if let Some(sig) = self.signal {
            return sig == SIGTERM || sig == SIGKILL;
        }
        matches!(
            self.code,
            Some(0 | TIMEOUT_EXIT | SIGKILL_EXIT | SIGTERM_EXIT)
        )
    }
}

impl fmt::Display for AgentExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}")?,
            (None, Some(sig)) => write!(f, "signal {sig}")?,
            (None, None) => f.write_str("unknown exit")?,
        }
        if self.timed_out {
            f.write_str(" (timed out)")?;
        }
        Ok(())
    }
}
