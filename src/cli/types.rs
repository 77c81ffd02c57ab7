//! CLI type definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::commands::{config::ConfigArgs, health::HealthArgs, run::RunArgs, serve::ServeArgs};

#[derive(Parser, Debug)]
#[command(name = "taskrelay")]
#[command(about = "Taskrelay - hands tracked tasks to a coding agent and reconciles the result", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this YAML file instead of .taskrelay/
    #[arg(short, long, global = true, env = "TASKRELAY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the webhook receiver
    Serve(ServeArgs),

    /// Run the agent for a single task in the foreground
    Run(RunArgs),

    /// Check credentials, the agent binary and the git repository
    Health(HealthArgs),

    /// Print the effective configuration with secrets redacted
    Config(ConfigArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Platform;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "taskrelay",
            "--json",
            "run",
            "--platform",
            "github",
            "--task-id",
            "42",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.platform, Platform::GitHub);
                assert_eq!(args.task_id, "42");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["taskrelay", "config", "--config", "relay.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("relay.yaml")));
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let result = Cli::try_parse_from(["taskrelay", "run", "--platform", "jira", "--task-id", "1"]);
        assert!(result.is_err());
    }
}
