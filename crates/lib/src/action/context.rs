//! The build context handed to rule implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use super::actions::Actions;
use crate::label;
use crate::platform::Platform;
use crate::rule::RuleInstance;
use crate::value::Value;

/// Per-build environment shared by every action.
#[derive(Debug, Clone)]
pub struct ExecEnv {
  pub root: PathBuf,
  pub platform: Platform,
  pub args: Vec<String>,
  pub cancel: CancellationToken,
}

impl ExecEnv {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      platform: Platform::current(),
      args: Vec::new(),
      cancel: CancellationToken::new(),
    }
  }
}

/// Read-only view of one rule invocation.
#[derive(Debug, Clone)]
pub struct BuildContext {
  key: String,
  label: String,
  name: String,
  attrs: BTreeMap<String, Value>,
  os: String,
  arch: String,
  build_dir: String,
  build_file_path: String,
  args: Vec<String>,
  actions: Actions,
}

impl BuildContext {
  pub fn new(key: &str, label: &str, instance: &RuleInstance, attrs: BTreeMap<String, Value>, env: &ExecEnv) -> Self {
    Self {
      key: key.to_string(),
      label: label.to_string(),
      name: instance.name().to_string(),
      attrs,
      os: env.platform.os.as_str().to_string(),
      arch: env.platform.arch.as_str().to_string(),
      build_dir: instance.dir().to_string(),
      build_file_path: instance.build_file().to_string(),
      args: env.args.clone(),
      actions: Actions::new(&env.root, fs_dir(&env.root, instance.dir()), env.cancel.clone()),
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Attributes with label attributes replaced by their resolved targets.
  pub fn attrs(&self) -> &BTreeMap<String, Value> {
    &self.attrs
  }

  pub fn attr(&self, name: &str) -> Option<&Value> {
    self.attrs.get(name)
  }

  pub fn os(&self) -> &str {
    &self.os
  }

  pub fn arch(&self) -> &str {
    &self.arch
  }

  pub fn build_dir(&self) -> &str {
    &self.build_dir
  }

  pub fn build_file_path(&self) -> &str {
    &self.build_file_path
  }

  /// Trailing arguments passed through from the command line.
  pub fn args(&self) -> &[String] {
    &self.args
  }

  pub fn actions(&self) -> &Actions {
    &self.actions
  }
}

fn fs_dir(root: &Path, dir: &str) -> PathBuf {
  if dir.starts_with('/') {
    PathBuf::from(dir)
  } else {
    root.join(label::clean(dir))
  }
}
