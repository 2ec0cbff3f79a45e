use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::ActionId;
use super::context::{BuildContext, ExecEnv};
use crate::attr::AttrValue;
use crate::rule::RuleInstance;
use crate::value::{FileInfo, Target, Value};

/// Errors recorded on a node when its work fails.
///
/// Execution errors stay local to the failing node; dependents are marked failed without
/// running and report this error through [`ActionGraph::failure`](super::ActionGraph::failure).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
  /// Raised by a rule implementation.
  #[error("{0}")]
  Failed(String),

  #[error("{program} exited with {}: {output}", exit_status(.code))]
  Command {
    program: String,
    code: Option<i32>,
    output: String,
  },

  #[error("{path}: {message}")]
  Io { path: String, message: String },

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// An action the engine deliberately leaves to external tools.
  #[error("{0}")]
  Unsupported(String),

  #[error("cancelled")]
  Cancelled,

  #[error("action {key} panicked")]
  Panicked { key: String },

  #[error("unknown failure in {key}")]
  UnknownFailure { key: String },
}

fn exit_status(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("code {}", code),
    None => "a signal".to_string(),
  }
}

impl ActionError {
  pub(crate) fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
    ActionError::Io {
      path: path.into(),
      message: err.to_string(),
    }
  }
}

/// A rule attribute after graph construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionAttr {
  /// Passed through unchanged.
  Value(AttrValue),
  /// A label attribute left empty; appears as nil.
  Unset,
  /// A label attribute, replaced by the dependency it resolved to.
  Target { id: ActionId, label: String },
  /// A label list, element order preserved.
  Targets(Vec<(ActionId, String)>),
}

impl ActionAttr {
  /// Materialize the attribute for the build context, given the values produced by dependencies.
  fn resolve(&self, inputs: &HashMap<ActionId, Value>) -> Value {
    let target = |id: &ActionId, label: &str| {
      Value::Target(Box::new(Target {
        label: label.to_string(),
        value: inputs.get(id).cloned().unwrap_or_default(),
      }))
    };

    match self {
      ActionAttr::Value(value) => Value::from(value),
      ActionAttr::Unset => Value::Nil,
      ActionAttr::Target { id, label } => target(id, label),
      ActionAttr::Targets(targets) => Value::List(targets.iter().map(|(id, label)| target(id, label)).collect()),
    }
  }
}

/// Deferred work of a node.
#[derive(Debug)]
pub enum Work {
  /// Report the metadata of a plain file.
  File { path: PathBuf },
  /// Invoke a rule implementation with the resolved attributes.
  Rule(RuleWork),
}

#[derive(Debug)]
pub struct RuleWork {
  instance: Arc<RuleInstance>,
  attrs: BTreeMap<String, ActionAttr>,
}

impl RuleWork {
  pub fn new(instance: Arc<RuleInstance>, attrs: BTreeMap<String, ActionAttr>) -> Self {
    Self { instance, attrs }
  }

  pub fn instance(&self) -> &Arc<RuleInstance> {
    &self.instance
  }

  pub fn attrs(&self) -> &BTreeMap<String, ActionAttr> {
    &self.attrs
  }
}

impl Work {
  /// Run the work. `inputs` holds the produced value of every dependency.
  pub(crate) fn run(
    &self,
    key: &str,
    label: &str,
    inputs: &HashMap<ActionId, Value>,
    env: &ExecEnv,
  ) -> Result<Value, ActionError> {
    match self {
      Work::File { path } => {
        let meta = fs::metadata(path).map_err(|e| ActionError::io(path.display().to_string(), &e))?;
        Ok(Value::File(FileInfo::from_metadata(key, path, &meta)))
      }
      Work::Rule(rule) => {
        let attrs = rule
          .attrs
          .iter()
          .map(|(name, attr)| (name.clone(), attr.resolve(inputs)))
          .collect();
        let ctx = BuildContext::new(key, label, &rule.instance, attrs, env);
        rule.instance.rule().implementation().invoke(&ctx)
      }
    }
  }
}
