use std::path::PathBuf;

use thiserror::Error;

use crate::action::{ActionError, ActionId};
use crate::attr::{AttrError, AttrType};
use crate::eval::EvalError;
use crate::execute::{ExecuteConfig, ExecuteError, ExecuteStats};
use crate::label::LabelError;
use crate::rule::RuleError;
use crate::value::Value;

/// Errors of graph construction. Any of them aborts the whole build.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Label(#[from] LabelError),

  #[error("{file}: {source}")]
  Eval {
    file: String,
    #[source]
    source: EvalError,
  },

  #[error(transparent)]
  Evaluator(EvalError),

  #[error("directory {dir} not found: {message}")]
  MissingDirectory { dir: String, message: String },

  #[error("{0} is not a directory")]
  NotADirectory(String),

  #[error("label not found: {0}")]
  LabelNotFound(String),

  #[error("{path}: {message}")]
  Io { path: String, message: String },

  #[error("unknown query parameter '{param}' in {label}")]
  UnknownQueryParam { label: String, param: String },

  #[error("cannot override {ty} attribute '{param}' in {label}: only attr.string accepts overrides")]
  UnsupportedOverride {
    label: String,
    param: String,
    ty: AttrType,
  },

  #[error("query parameter '{param}' in {label} must have exactly one value, got {count}")]
  OverrideArity {
    label: String,
    param: String,
    count: usize,
  },

  #[error("query parameters are not allowed on file label {0}")]
  QueryOnFile(String),

  #[error("attribute {attr} of {label}: {target} is a file, but the attribute does not allow files")]
  FilesNotAllowed {
    label: String,
    attr: String,
    target: String,
  },

  #[error("attribute {attr} of {label}: file {target} does not have an allowed extension")]
  FileTypeNotAllowed {
    label: String,
    attr: String,
    target: String,
  },

  #[error("attribute {attr} of {label}: {target} is not executable")]
  NotExecutable {
    label: String,
    attr: String,
    target: String,
  },

  #[error("dependency cycle: {}", .chain.join(" -> "))]
  Cycle { chain: Vec<String> },

  #[error(transparent)]
  Attr(#[from] AttrError),

  #[error(transparent)]
  Rule(#[from] RuleError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),
}

/// Configuration for a build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Directory labels are relative to.
  pub root: PathBuf,

  pub execute: ExecuteConfig,

  /// Trailing command-line arguments, visible to rules as `ctx.args`.
  pub args: Vec<String>,
}

impl BuildConfig {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      ..Default::default()
    }
  }
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      root: PathBuf::from("."),
      execute: ExecuteConfig::default(),
      args: Vec::new(),
    }
  }
}

/// Result of building one root label.
#[derive(Debug)]
pub struct BuildOutcome {
  pub root: ActionId,
  pub label: String,
  /// The root's value, or the most specific error behind its failure.
  pub result: Result<Value, ActionError>,
  pub stats: ExecuteStats,
}

impl BuildOutcome {
  pub fn is_success(&self) -> bool {
    self.result.is_ok()
  }

  pub fn value(&self) -> Option<&Value> {
    self.result.as_ref().ok()
  }

  pub fn error(&self) -> Option<&ActionError> {
    self.result.as_ref().err()
  }
}
