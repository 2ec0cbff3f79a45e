//! Subprocess execution.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::RunOpts;
use crate::action::ActionError;

/// Run `opts.name` in `cwd`, blocking the calling worker thread until it exits.
///
/// The child is killed if `cancel` fires first.
pub(super) fn execute_run(opts: &RunOpts, cwd: &Path, cancel: &CancellationToken) -> Result<String, ActionError> {
  let handle = Handle::try_current()
    .map_err(|_| ActionError::Failed("running a subprocess requires a tokio runtime".to_string()))?;
  handle.block_on(execute_run_async(opts, cwd, cancel))
}

/// Run `opts.name` in `cwd` without holding a thread while the child runs.
pub(super) async fn execute_run_async(
  opts: &RunOpts,
  cwd: &Path,
  cancel: &CancellationToken,
) -> Result<String, ActionError> {
  if opts.name.is_empty() {
    return Err(ActionError::InvalidArgument("run requires a program name".to_string()));
  }

  let mut envs = Vec::with_capacity(opts.env.len());
  for entry in &opts.env {
    let (key, value) = entry
      .split_once('=')
      .ok_or_else(|| ActionError::InvalidArgument(format!("env entry {:?} is not KEY=VALUE", entry)))?;
    envs.push((key.to_string(), value.to_string()));
  }

  info!(program = %opts.name, args = ?opts.args, "running command");
  run_command(opts, envs, cwd, cancel).await
}

async fn run_command(
  opts: &RunOpts,
  envs: Vec<(String, String)>,
  cwd: &Path,
  cancel: &CancellationToken,
) -> Result<String, ActionError> {
  let mut command = Command::new(&opts.name);
  command
    .args(&opts.args)
    .envs(envs)
    .current_dir(cwd)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  debug!(program = %opts.name, working_dir = ?cwd, "spawning process");
  let child = command.spawn().map_err(|e| ActionError::io(&opts.name, &e))?;

  let output = tokio::select! {
    output = child.wait_with_output() => output.map_err(|e| ActionError::io(&opts.name, &e))?,
    _ = cancel.cancelled() => {
      info!(program = %opts.name, "build cancelled, killing command");
      return Err(ActionError::Cancelled);
    }
  };

  let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
  combined.push_str(&String::from_utf8_lossy(&output.stderr));

  if !output.status.success() {
    debug!(output = %combined, "command failed");
    return Err(ActionError::Command {
      program: opts.name.clone(),
      code: output.status.code(),
      output: combined,
    });
  }

  Ok(combined)
}
