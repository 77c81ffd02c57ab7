//! Implementation of the `taskrelay config` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigOutput {
    pub config: Config,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|e| format!("<failed to render configuration: {e}>"))
    }
}

pub fn execute(_args: ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    let redacted = config.redacted();
    // Render once up front so a serialization failure surfaces as an error.
    serde_yaml::to_string(&redacted).context("Failed to render configuration")?;
    output(&ConfigOutput { config: redacted }, json_mode);
    Ok(())
}
