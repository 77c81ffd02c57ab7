//! Implementation of the `taskrelay run` command.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::application::{RunOutcome, RunTrigger};
use crate::cli::output::{output, CommandOutput};
use crate::cli::Relay;
use crate::domain::models::{Config, Platform, RunState};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Platform the task lives on (clickup or github)
    #[arg(long, short)]
    pub platform: Platform,

    /// ClickUp task id or GitHub issue number
    #[arg(long, short)]
    pub task_id: String,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct RunOutput {
    pub outcome: RunOutcome,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let o = &self.outcome;
        let mut lines = vec![
            format!("Run {} for task {}: {}", o.run_id, o.task_id, o.state),
            format!("  branch:    {}", o.branch),
        ];
        if let Some(signal) = &o.signal {
            lines.push(format!("  signal:    {}", signal.kind()));
        }
        if let Some(exit) = &o.exit {
            lines.push(format!("  agent:     {exit}"));
        }
        if let Some(report) = &o.report {
            match &report.pull_request {
                Some(pr) => lines.push(format!("  pull req:  {}", pr.url)),
                None => lines.push("  pull req:  none found".to_string()),
            }
            if report.status_updated {
                lines.push("  status:    updated".to_string());
            }
            if report.manual_steps_posted {
                lines.push("  comment:   manual steps posted".to_string());
            }
            for failure in &report.failures {
                lines.push(format!("  failed:    {failure}"));
            }
        }
        lines.push(format!(
            "  workspace: {}",
            if o.workspace_released { "released" } else { "kept" }
        ));
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, config: Config, json_mode: bool) -> Result<()> {
    let relay = Relay::build(config).await?;
    if !relay.orchestrator.supports(args.platform) {
        anyhow::bail!("{} is not configured", args.platform);
    }

    let trigger = RunTrigger::new(args.platform, args.task_id, "cli");
    let outcome = relay.orchestrator.handle(trigger).await?;
    let state = outcome.state;
    output(&RunOutput { outcome }, json_mode);

    if state != RunState::Completed {
        anyhow::bail!("Run ended {state}");
    }
    Ok(())
}
