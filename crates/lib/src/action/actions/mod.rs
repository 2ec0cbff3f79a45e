//! Side-effecting capabilities exposed to rule implementations.
//!
//! Every operation resolves relative paths against the build root and refuses to start once
//! the build has been cancelled. Operations block; they are called from worker threads. `run`
//! and `tar` also have async forms for callers that must not hold a thread, such as the Lua
//! runtime, which is released while they are awaited.

mod files;
mod packaging;
mod run;

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use super::ActionError;
use crate::value::FileInfo;

/// Options for [`Actions::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOpts {
  /// Program to execute, looked up on `PATH` when not a path.
  pub name: String,
  pub args: Vec<String>,
  /// `KEY=VALUE` entries added to the inherited environment.
  pub env: Vec<String>,
}

/// Options for [`Actions::write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOpts {
  pub name: String,
  pub content: Vec<u8>,
  pub mode: u32,
}

/// Options for [`Actions::tar`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TarOpts {
  /// Output archive, gzip compressed.
  pub name: String,
  pub files: Vec<String>,
  /// Mode recorded for every entry.
  pub mode: u32,
  /// Prefix removed from each entry name.
  pub strip_prefix: Option<String>,
  /// Directory prepended to each entry name.
  pub package_dir: Option<String>,
}

/// Capability object handed to rule implementations as `ctx.actions`.
#[derive(Debug, Clone)]
pub struct Actions {
  root: PathBuf,
  dir: PathBuf,
  cancel: CancellationToken,
}

impl Actions {
  /// `dir` is the directory subprocesses run in, normally the rule's own directory.
  pub fn new(root: &Path, dir: PathBuf, cancel: CancellationToken) -> Self {
    Self {
      root: root.to_path_buf(),
      dir,
      cancel,
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn cancel_token(&self) -> &CancellationToken {
    &self.cancel
  }

  /// Run a subprocess and return its combined stdout and stderr.
  pub fn run(&self, opts: &RunOpts) -> Result<String, ActionError> {
    self.ensure_active()?;
    run::execute_run(opts, &self.dir, &self.cancel)
  }

  /// Async form of [`Actions::run`].
  pub async fn run_async(&self, opts: &RunOpts) -> Result<String, ActionError> {
    self.ensure_active()?;
    run::execute_run_async(opts, &self.dir, &self.cancel).await
  }

  pub fn stat(&self, name: &str) -> Result<FileInfo, ActionError> {
    self.ensure_active()?;
    files::stat(&self.resolve(name), name)
  }

  pub fn write(&self, opts: &WriteOpts) -> Result<FileInfo, ActionError> {
    self.ensure_active()?;
    files::write(&self.resolve(&opts.name), opts)
  }

  /// Join `parts` into a path, create its parent directory, and return it absolute.
  pub fn declare(&self, parts: &[String]) -> Result<String, ActionError> {
    self.ensure_active()?;
    files::declare(&self.root, parts)
  }

  pub fn tar(&self, opts: &TarOpts) -> Result<FileInfo, ActionError> {
    self.ensure_active()?;
    packaging::write_tar(self, opts)
  }

  /// Async form of [`Actions::tar`]; the archive is written on the blocking pool.
  pub async fn tar_async(&self, opts: TarOpts) -> Result<FileInfo, ActionError> {
    let actions = self.clone();
    tokio::task::spawn_blocking(move || actions.tar(&opts))
      .await
      .map_err(|e| ActionError::Failed(format!("tar task failed: {}", e)))?
  }

  pub(crate) fn resolve(&self, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.root.join(path)
    }
  }

  fn ensure_active(&self) -> Result<(), ActionError> {
    if self.cancel.is_cancelled() {
      return Err(ActionError::Cancelled);
    }
    Ok(())
  }
}
