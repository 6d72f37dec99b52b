//! Runs cleaning and loading as two child processes of this executable

use anyhow::{Context, Error, bail};
use std::path::Path;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::PipelineConfig;

/// What happened to the two steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Loaded,
    /// Cleaning didn't pass its gate, nothing was loaded
    CleanFailed,
}

pub fn clean_command(exe: &Path, config: &PipelineConfig) -> Command {
    let mut command = Command::new(exe);
    command
        .arg("clean")
        .arg(&config.input_path)
        .arg(&config.output_path);
    if let Some(max_failures) = config.max_failures {
        command.arg("--max-failures").arg(max_failures.to_string());
    }
    command
}

pub fn import_command(exe: &Path, config: &PipelineConfig) -> Command {
    let mut command = Command::new(exe);
    command
        .arg("import")
        .arg(&config.output_path)
        .arg("--table")
        .arg(config.table.to_string());
    command
}

/// Runs `clean`, and `import` only if `clean` exited successfully.
#[tracing::instrument(err, skip_all)]
pub async fn run_steps(mut clean: Command, mut import: Command) -> Result<PipelineOutcome, Error> {
    let status = clean.status().await.context("couldn't start the clean step")?;
    if !status.success() {
        warn!("clean step failed ({status}), skipping import");
        return Ok(PipelineOutcome::CleanFailed);
    }
    info!("clean step done");

    let status = import.status().await.context("couldn't start the import step")?;
    if !status.success() {
        bail!("import step failed ({status})");
    }
    info!("import step done");

    Ok(PipelineOutcome::Loaded)
}

pub async fn run(config: &PipelineConfig) -> Result<PipelineOutcome, Error> {
    let exe = std::env::current_exe().context("couldn't locate the hut_pipeline executable")?;

    run_steps(clean_command(&exe, config), import_command(&exe, config)).await
}
