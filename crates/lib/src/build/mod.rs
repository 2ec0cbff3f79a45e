//! Action graph construction.
//!
//! [`Builder::create_action`] turns a label into a node of the [`ActionGraph`], evaluating the
//! build file of every directory it touches (once per build) and recursing through label
//! attributes. Nodes are memoized by canonical label, so a dependency shared by several rules is
//! built once. Any construction error aborts the whole build; only execution tolerates partial
//! failure.

mod types;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::action::context::ExecEnv;
use crate::action::{ActionAttr, ActionGraph, ActionId, ActionNode, RuleWork, Work};
use crate::attr::{AllowFiles, AttrDescriptor, AttrError, AttrType, AttrValue};
use crate::consts::BUILD_FILE_NAME;
use crate::eval::{BuildFile, BuildFileEvaluator};
use crate::execute::{self, ExecuteStats};
use crate::label::{self, Label};
use crate::lua::LuaEvaluator;
use crate::platform::Platform;
use crate::rule::{RuleInstance, SharedRegistry};

pub use types::{BuildConfig, BuildError, BuildOutcome};

/// Builds and executes the action graph of one build.
pub struct Builder {
  config: BuildConfig,
  registry: SharedRegistry,
  evaluator: Box<dyn BuildFileEvaluator>,
  graph: ActionGraph,
  evaluated: HashSet<String>,
  visiting: Vec<String>,
}

impl Builder {
  /// Create a builder that evaluates `BUILD.lua` files with the embedded Lua runtime.
  pub fn new(config: BuildConfig) -> Result<Self, BuildError> {
    let registry = SharedRegistry::default();
    let evaluator = LuaEvaluator::new(&config.root, registry.clone()).map_err(BuildError::Evaluator)?;
    Ok(Self::with_evaluator(config, registry, Box::new(evaluator)))
  }

  /// Create a builder around any evaluator. `registry` must be the one the evaluator registers
  /// rule instances into.
  pub fn with_evaluator(config: BuildConfig, registry: SharedRegistry, evaluator: Box<dyn BuildFileEvaluator>) -> Self {
    Self {
      config,
      registry,
      evaluator,
      graph: ActionGraph::new(),
      evaluated: HashSet::new(),
      visiting: Vec::new(),
    }
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  pub fn graph(&self) -> &ActionGraph {
    &self.graph
  }

  pub fn registry(&self) -> &SharedRegistry {
    &self.registry
  }

  /// Return the node for `label`, constructing it and everything it depends on if needed.
  ///
  /// Relative labels are resolved against the build root.
  pub fn create_action(&mut self, label: &str) -> Result<ActionId, BuildError> {
    self.create_action_in(label, "")
  }

  fn create_action_in(&mut self, label: &str, base_dir: &str) -> Result<ActionId, BuildError> {
    let label = label::resolve(label, base_dir)?;
    let canonical = label.to_string();
    if let Some(id) = self.graph.get(&canonical) {
      return Ok(id);
    }

    if let Some(pos) = self.visiting.iter().position(|l| *l == canonical) {
      let mut chain = self.visiting[pos..].to_vec();
      chain.push(canonical);
      return Err(BuildError::Cycle { chain });
    }

    self.visiting.push(canonical);
    let result = self.construct(&label);
    self.visiting.pop();
    result
  }

  fn construct(&mut self, label: &Label) -> Result<ActionId, BuildError> {
    let dir = label.dir();
    let fs_dir = self.fs_path(&dir);
    match fs::metadata(&fs_dir) {
      Ok(meta) if meta.is_dir() => {}
      Ok(_) => return Err(BuildError::NotADirectory(dir)),
      Err(e) => {
        return Err(BuildError::MissingDirectory {
          dir,
          message: e.to_string(),
        });
      }
    }

    self.load_build_file(&dir)?;

    let instance = self.registry.lock().get(label.path());
    match instance {
      Some(instance) => self.rule_action(label, instance),
      None => self.file_action(label),
    }
  }

  /// Evaluate the build file in `dir` unless it is absent or was already evaluated.
  fn load_build_file(&mut self, dir: &str) -> Result<(), BuildError> {
    let path = label::join(dir, BUILD_FILE_NAME);
    if self.evaluated.contains(&path) {
      return Ok(());
    }

    let fs_path = self.fs_path(&path);
    if !fs_path.is_file() {
      return Ok(());
    }

    info!(file = %path, "evaluating build file");
    let file = BuildFile {
      path: path.clone(),
      fs_path,
    };
    let bindings = self.evaluator.evaluate(&file).map_err(|source| BuildError::Eval {
      file: path.clone(),
      source,
    })?;
    debug!(file = %path, bindings = bindings.len(), "build file evaluated");
    self.evaluated.insert(path);
    Ok(())
  }

  fn file_action(&mut self, label: &Label) -> Result<ActionId, BuildError> {
    let canonical = label.to_string();
    let path = self.fs_path(label.path());
    if let Err(e) = fs::metadata(&path) {
      return Err(match e.kind() {
        io::ErrorKind::NotFound => BuildError::LabelNotFound(canonical),
        _ => BuildError::Io {
          path: path.display().to_string(),
          message: e.to_string(),
        },
      });
    }
    if label.has_params() {
      return Err(BuildError::QueryOnFile(canonical));
    }

    debug!(label = %canonical, "created file action");
    let node = ActionNode::new(label.path(), canonical, Vec::new(), Work::File { path });
    Ok(self.graph.insert(node))
  }

  fn rule_action(&mut self, label: &Label, instance: Arc<RuleInstance>) -> Result<ActionId, BuildError> {
    let canonical = label.to_string();
    let values = apply_overrides(label, &instance)?;

    let mut deps = Vec::new();
    let mut attrs = BTreeMap::new();
    for (name, value) in values {
      let Some(descriptor) = instance.rule().attr(&name) else {
        continue;
      };
      if !descriptor.attr_type().is_supported() {
        return Err(AttrError::Unsupported(descriptor.attr_type()).into());
      }

      let attr = match value {
        AttrValue::Label(target) if target.is_empty() => ActionAttr::Unset,
        AttrValue::Label(target) => {
          let (id, dep_label) = self.dependency(&canonical, &name, descriptor, &target, instance.dir())?;
          deps.push(id);
          ActionAttr::Target { id, label: dep_label }
        }
        AttrValue::LabelList(targets) => {
          let mut resolved = Vec::with_capacity(targets.len());
          for target in &targets {
            let (id, dep_label) = self.dependency(&canonical, &name, descriptor, target, instance.dir())?;
            deps.push(id);
            resolved.push((id, dep_label));
          }
          ActionAttr::Targets(resolved)
        }
        other => ActionAttr::Value(other),
      };
      attrs.insert(name, attr);
    }

    debug!(label = %canonical, deps = deps.len(), "created rule action");
    let key = instance.key().to_string();
    let node = ActionNode::new(key, canonical, deps, Work::Rule(RuleWork::new(instance, attrs)));
    Ok(self.graph.insert(node))
  }

  /// Resolve one label attribute value of `owner` and check it against the descriptor.
  fn dependency(
    &mut self,
    owner: &str,
    attr: &str,
    descriptor: &AttrDescriptor,
    target: &str,
    dir: &str,
  ) -> Result<(ActionId, String), BuildError> {
    let id = self.create_action_in(target, dir)?;
    let node = self.graph.node(id);
    let dep_label = node.label().to_string();

    if let Work::File { path } = node.work() {
      let denied = |err: fn(String, String, String) -> BuildError| err(owner.to_string(), attr.to_string(), dep_label.clone());
      match descriptor.allow_files() {
        AllowFiles::No => return Err(denied(files_not_allowed)),
        allow if !allow.permits(label::basename(node.key())) => return Err(denied(file_type_not_allowed)),
        _ => {}
      }
      if descriptor.executable() && !is_executable(path) {
        return Err(denied(not_executable));
      }
    }

    Ok((id, dep_label))
  }

  /// Execute everything reachable from `root`.
  pub async fn execute(&mut self, root: ActionId) -> Result<ExecuteStats, BuildError> {
    let env = ExecEnv {
      root: self.config.root.clone(),
      platform: Platform::current(),
      args: self.config.args.clone(),
      cancel: self.config.execute.cancel.clone(),
    };
    Ok(execute::execute(&mut self.graph, root, &env, &self.config.execute).await?)
  }

  /// Construct the graph for `label` and execute it.
  ///
  /// Construction errors are returned as `Err`; execution failures are reported through
  /// [`BuildOutcome::result`].
  pub async fn build(&mut self, label: &str) -> Result<BuildOutcome, BuildError> {
    let root = self.create_action(label)?;
    let stats = self.execute(root).await?;

    let node = self.graph.node(root);
    let result = match self.graph.failure(root) {
      Some(err) => Err(err),
      None => Ok(node.value().cloned().unwrap_or_default()),
    };

    Ok(BuildOutcome {
      root,
      label: node.label().to_string(),
      result,
      stats,
    })
  }

  fn fs_path(&self, path: &str) -> PathBuf {
    self.config.root.join(path)
  }
}

/// Copy the instance's attributes with the label's query parameters applied.
fn apply_overrides(label: &Label, instance: &RuleInstance) -> Result<BTreeMap<String, AttrValue>, BuildError> {
  let mut attrs = instance.attrs().clone();

  for (param, values) in label.params() {
    let descriptor = instance
      .rule()
      .attr(param)
      .ok_or_else(|| BuildError::UnknownQueryParam {
        label: label.to_string(),
        param: param.clone(),
      })?;
    if descriptor.attr_type() != AttrType::String {
      return Err(BuildError::UnsupportedOverride {
        label: label.to_string(),
        param: param.clone(),
        ty: descriptor.attr_type(),
      });
    }
    let [value] = values.as_slice() else {
      return Err(BuildError::OverrideArity {
        label: label.to_string(),
        param: param.clone(),
        count: values.len(),
      });
    };

    let value = AttrValue::String(value.clone());
    descriptor.check(param, &value)?;
    debug!(label = %label, param = %param, "applied query override");
    attrs.insert(param.clone(), value);
  }

  Ok(attrs)
}

fn files_not_allowed(label: String, attr: String, target: String) -> BuildError {
  BuildError::FilesNotAllowed { label, attr, target }
}

fn file_type_not_allowed(label: String, attr: String, target: String) -> BuildError {
  BuildError::FileTypeNotAllowed { label, attr, target }
}

fn not_executable(label: String, attr: String, target: String) -> BuildError {
  BuildError::NotExecutable { label, attr, target }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
  true
}
