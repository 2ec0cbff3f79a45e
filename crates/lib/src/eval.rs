//! The seam between graph construction and the build-file language.
//!
//! The builder only needs one capability from an interpreter: evaluate a build file, letting it
//! register rule instances, and report the names it bound. [`crate::lua::LuaEvaluator`] is the
//! implementation used by the command line; tests can substitute their own.

use std::path::PathBuf;

use thiserror::Error;

use crate::attr::AttrError;
use crate::rule::RuleError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
  #[error(transparent)]
  Rule(#[from] RuleError),

  #[error(transparent)]
  Attr(#[from] AttrError),

  #[error("{0}")]
  Script(String),

  #[error("failed to initialize build language: {0}")]
  Runtime(String),
}

/// A build file about to be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFile {
  /// Root-relative path, e.g. `cmd/hello/BUILD.lua`. Rule instances register under its
  /// directory.
  pub path: String,
  /// Where to read it from.
  pub fs_path: PathBuf,
}

pub trait BuildFileEvaluator: Send {
  /// Evaluate `file`, registering the rule instances it declares. Returns the names of its
  /// top-level bindings, sorted.
  fn evaluate(&mut self, file: &BuildFile) -> Result<Vec<String>, EvalError>;
}
