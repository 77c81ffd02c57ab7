//! End-to-end agent runs: a real worktree, a shell script standing in for
//! the agent, and in-memory fakes for the work tracker and PR host.

mod common;

use chrono::Duration;
use common::{orchestrator, sentinel, Call, FakePlatform, FakePullRequests, Sandbox, PR_URL};

use taskrelay::application::{RunError, RunTrigger};
use taskrelay::domain::models::{CompletionSignal, Platform, ResultSubtype, RunState, WorkItem};

const READY: &str = "Ready for Review (DEV)";
const IN_PROGRESS: &str = "in progress";

fn login_task() -> WorkItem {
    WorkItem::new("T1", "Add login page", Platform::ClickUp)
        .with_description("Users need to sign in with email and password.")
}

/// `printf` keeps JSON escapes intact where `echo` may not.
fn print_lines(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| format!("printf '%s\\n' '{line}'"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn trigger() -> RunTrigger {
    RunTrigger::new(Platform::ClickUp, "T1", "test")
}

#[tokio::test]
async fn test_explicit_marker_then_clean_exit() {
    common::setup_test_logging();
    let sandbox = Sandbox::new();
    let done = format!("{} implementation finished, PR created", sentinel("T1"));
    let script = print_lines(&[
        "Implementing the login page",
        "## Manual Steps",
        "- Add LOGIN_SECRET to production",
        &done,
    ]);
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::aged(Duration::minutes(2));
    let relay = orchestrator(sandbox.config(&script), platform.clone(), prs.clone());

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert!(matches!(
        outcome.signal,
        Some(CompletionSignal::ExplicitMarker { ref payload }) if payload.starts_with(&sentinel("T1"))
    ));
    assert_eq!(outcome.exit.unwrap().code, Some(0));
    assert_eq!(platform.statuses(), vec![IN_PROGRESS, READY]);

    let fields = platform.fields();
    assert!(fields.contains(&(
        "GitHub Pull Request URL".to_string(),
        "https://github.com/acme/widgets/pull/17".to_string()
    )));
    assert!(fields.contains(&("GitHub Branch".to_string(), outcome.branch.clone())));

    let comments = platform.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("## Manual Steps"));
    assert!(comments[0].contains("- Add LOGIN_SECRET to production"));
    assert!(!comments[0].contains("AUTOMATION_COMPLETE"));

    assert!(outcome.workspace_released);
    assert!(sandbox.worktrees().is_empty());
    assert!(outcome.branch.starts_with("T1/feature/"));
}

#[tokio::test]
async fn test_sigterm_exit_with_pr_found_on_third_attempt() {
    let sandbox = Sandbox::new();
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::after(2, Some(Duration::minutes(2)));
    let relay = orchestrator(
        sandbox.config("echo 'pushed branch'; exit 143"),
        platform.clone(),
        prs.clone(),
    );

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.signal, Some(CompletionSignal::ExternalEvidence));
    assert_eq!(outcome.exit.unwrap().code, Some(143));
    assert_eq!(prs.lookups(), 3);
    assert_eq!(platform.statuses(), vec![IN_PROGRESS, READY]);
    assert_eq!(platform.fields().len(), 2);
    assert!(platform.comments().is_empty());
    assert!(outcome.workspace_released);
}

#[tokio::test]
async fn test_stale_pr_is_not_attributed() {
    let sandbox = Sandbox::new();
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::aged(Duration::minutes(20));
    let relay = orchestrator(
        sandbox.config("echo 'nothing to report'; exit 0"),
        platform.clone(),
        prs.clone(),
    );

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Crashed);
    assert!(outcome.signal.is_none());
    assert!(outcome.report.is_none());
    assert_eq!(prs.lookups(), 1);
    assert_eq!(platform.statuses(), vec![IN_PROGRESS]);
    assert!(platform.fields().is_empty());
    assert!(platform.comments().is_empty());
    assert!(sandbox.worktrees().is_empty());
}

#[tokio::test]
async fn test_failed_exit_skips_lookup() {
    let sandbox = Sandbox::new();
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::aged(Duration::minutes(1));
    let relay = orchestrator(
        sandbox.config("echo 'compile error' >&2; exit 1"),
        platform.clone(),
        prs.clone(),
    );

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Crashed);
    assert_eq!(outcome.exit.unwrap().code, Some(1));
    assert_eq!(prs.lookups(), 0);
    assert_eq!(platform.statuses(), vec![IN_PROGRESS]);
    assert!(outcome.workspace_released);

    let logs = sandbox.run_logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("compile error"));
}

#[tokio::test]
async fn test_structured_result_posts_manual_steps_once() {
    let sandbox = Sandbox::new();
    let result = format!(
        r#"{{"type":"result","subtype":"success","result":"Done.\n## Manual Steps\n- Run migrations\n{} implementation finished, PR created"}}"#,
        sentinel("T1")
    );
    let script = print_lines(&[r#"{"type":"system","subtype":"init"}"#, &result]);
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::aged(Duration::seconds(30));
    let relay = orchestrator(sandbox.config(&script), platform.clone(), prs);

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert!(matches!(
        outcome.signal,
        Some(CompletionSignal::StructuredResult {
            subtype: ResultSubtype::Success,
            ..
        })
    ));
    let comments = platform.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("- Run migrations"));
    assert!(outcome.report.unwrap().manual_steps_posted);
}

#[tokio::test]
async fn test_repeated_signals_reconcile_once() {
    let sandbox = Sandbox::new();
    let done = sentinel("T1");
    let result = format!(r#"{{"type":"result","subtype":"success","result":"{done}"}}"#);
    let script = print_lines(&[
        "## Manual Steps",
        "- Flip the feature flag",
        &done,
        &done,
        &result,
    ]);
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::aged(Duration::minutes(1));
    let relay = orchestrator(sandbox.config(&script), platform.clone(), prs.clone());

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(prs.lookups(), 1);
    assert_eq!(platform.statuses(), vec![IN_PROGRESS, READY]);
    assert_eq!(platform.fields().len(), 2);
    assert_eq!(platform.comments().len(), 1);
}

#[tokio::test]
async fn test_sentinel_for_other_task_is_ignored() {
    let sandbox = Sandbox::new();
    let script = print_lines(&[&sentinel("T10")]);
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::none();
    let relay = orchestrator(sandbox.config(&script), platform.clone(), prs.clone());

    let outcome = relay.handle(trigger()).await.unwrap();

    assert!(outcome.signal.is_none());
    assert_eq!(outcome.state, RunState::Crashed);
    assert_eq!(prs.lookups(), 3);
    assert_eq!(platform.statuses(), vec![IN_PROGRESS]);
}

#[tokio::test]
async fn test_timeout_without_evidence() {
    let sandbox = Sandbox::new();
    let mut config = sandbox.config("echo 'thinking'; sleep 30");
    config.agent.timeout_secs = 1;
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::none();
    let relay = orchestrator(config, platform.clone(), prs.clone());

    let started = std::time::Instant::now();
    let outcome = relay.handle(trigger()).await.unwrap();

    assert!(started.elapsed() < std::time::Duration::from_secs(15));
    assert_eq!(outcome.state, RunState::TimedOut);
    assert!(outcome.exit.unwrap().timed_out);
    assert_eq!(prs.lookups(), 3);
    assert_eq!(platform.statuses(), vec![IN_PROGRESS]);
    assert!(sandbox.worktrees().is_empty());
}

#[tokio::test]
async fn test_timeout_with_fresh_pr_completes() {
    let sandbox = Sandbox::new();
    let mut config = sandbox.config("sleep 30");
    config.agent.timeout_secs = 1;
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::aged(Duration::minutes(3));
    let relay = orchestrator(config, platform.clone(), prs);

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.signal, Some(CompletionSignal::ExternalEvidence));
    assert_eq!(platform.statuses(), vec![IN_PROGRESS, READY]);
}

#[tokio::test]
async fn test_missing_work_item_aborts_before_workspace() {
    let sandbox = Sandbox::new();
    let platform = FakePlatform::empty(Platform::ClickUp);
    let relay = orchestrator(sandbox.config("exit 0"), platform.clone(), FakePullRequests::none());

    let err = relay.handle(trigger()).await.unwrap_err();

    assert!(matches!(err, RunError::WorkItemFetch { .. }));
    assert!(platform.calls().is_empty());
    assert!(sandbox.worktrees().is_empty());
    assert!(sandbox.run_logs().is_empty());
}

#[tokio::test]
async fn test_unconfigured_platform_is_rejected() {
    let sandbox = Sandbox::new();
    let platform = FakePlatform::with_item(login_task());
    let relay = orchestrator(sandbox.config("exit 0"), platform, FakePullRequests::none());

    let err = relay
        .handle(RunTrigger::new(Platform::GitHub, "7", "test"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::PlatformNotConfigured(Platform::GitHub)));
}

#[tokio::test]
async fn test_agent_launch_failure_releases_workspace() {
    let sandbox = Sandbox::new();
    let mut config = sandbox.config("exit 0");
    config.agent.binary_path = "/nonexistent/agent-binary".to_string();
    let platform = FakePlatform::with_item(login_task());
    let relay = orchestrator(config, platform, FakePullRequests::none());

    let err = relay.handle(trigger()).await.unwrap_err();

    assert!(matches!(err, RunError::AgentLaunch(_)));
    assert!(sandbox.worktrees().is_empty());
}

#[tokio::test]
async fn test_deadline_holds_while_reconciling() {
    let sandbox = Sandbox::new();
    let scratch = tempfile::tempdir().unwrap();
    let marker = scratch.path().join("agent-still-running");
    let script = format!(
        "{}; sleep 3; touch '{}'",
        print_lines(&[&sentinel("T1")]),
        marker.display()
    );
    let mut config = sandbox.config(&script);
    config.agent.timeout_secs = 1;
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::slow(Duration::minutes(1), std::time::Duration::from_secs(4));
    let relay = orchestrator(config, platform.clone(), prs);

    let started = std::time::Instant::now();
    let outcome = relay.handle(trigger()).await.unwrap();

    // The PR host alone takes longer than the agent would have needed to
    // reach `touch`, so a missing marker means the agent was stopped.
    assert!(started.elapsed() >= std::time::Duration::from_secs(4));
    assert!(!marker.exists());
    assert_eq!(outcome.state, RunState::Completed);
    assert_ne!(outcome.exit.unwrap().code, Some(0));
    assert_eq!(platform.statuses(), vec![IN_PROGRESS, READY]);
    assert!(outcome.workspace_released);
    assert!(sandbox.worktrees().is_empty());
}

#[tokio::test]
async fn test_manual_steps_after_completion_line_are_not_posted() {
    let sandbox = Sandbox::new();
    let script = print_lines(&[&sentinel("T1"), "## Manual Steps", "- Set FOO in production"]);
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::aged(Duration::minutes(1));
    let relay = orchestrator(sandbox.config(&script), platform.clone(), prs);

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(platform.statuses(), vec![IN_PROGRESS, READY]);
    assert!(platform.comments().is_empty());
    assert!(!outcome.report.unwrap().manual_steps_posted);

    let logs = sandbox.run_logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].contains("late_manual_steps"));
    assert!(logs[0].contains("Set FOO in production"));
}

#[tokio::test]
async fn test_field_write_failure_does_not_block_other_steps() {
    let sandbox = Sandbox::new();
    let script = print_lines(&["## Manual Steps", "- Rotate the API key", &sentinel("T1")]);
    let platform = FakePlatform::failing(
        login_task(),
        Call::Field("GitHub Pull Request URL".to_string(), PR_URL.to_string()),
    );
    let prs = FakePullRequests::aged(Duration::minutes(1));
    let relay = orchestrator(sandbox.config(&script), platform.clone(), prs);

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(
        platform.fields(),
        vec![("GitHub Branch".to_string(), outcome.branch.clone())]
    );
    assert_eq!(platform.statuses(), vec![IN_PROGRESS, READY]);
    assert_eq!(platform.comments().len(), 1);

    let report = outcome.report.unwrap();
    assert_eq!(report.fields_written, vec!["GitHub Branch".to_string()]);
    assert!(report.status_updated);
    assert!(report.manual_steps_posted);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("GitHub Pull Request URL"));
    assert!(outcome.workspace_released);
}

#[tokio::test]
async fn test_status_failure_does_not_block_manual_steps() {
    let sandbox = Sandbox::new();
    let script = print_lines(&["## Manual Steps", "- Rotate the API key", &sentinel("T1")]);
    let platform = FakePlatform::failing(login_task(), Call::Status(READY.to_string()));
    let prs = FakePullRequests::aged(Duration::minutes(1));
    let relay = orchestrator(sandbox.config(&script), platform.clone(), prs);

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(platform.statuses(), vec![IN_PROGRESS]);
    assert_eq!(platform.fields().len(), 2);
    assert_eq!(platform.comments().len(), 1);

    let report = outcome.report.unwrap();
    assert!(!report.status_updated);
    assert!(report.manual_steps_posted);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].starts_with("update status"));
    assert!(sandbox.worktrees().is_empty());
}

#[tokio::test]
async fn test_sentinel_on_stderr_completes() {
    let sandbox = Sandbox::new();
    let script = format!("echo '{}' >&2", sentinel("T1"));
    let platform = FakePlatform::with_item(login_task());
    let prs = FakePullRequests::aged(Duration::minutes(1));
    let relay = orchestrator(sandbox.config(&script), platform.clone(), prs);

    let outcome = relay.handle(trigger()).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert!(matches!(outcome.signal, Some(CompletionSignal::ExplicitMarker { .. })));
    assert_eq!(platform.statuses(), vec![IN_PROGRESS, READY]);
    assert!(platform.comments().is_empty());
}
