//! Rule definitions, instances, and the instance registry.
//!
//! A [`RuleDefinition`] couples an implementation callback with an attribute schema. Calling it
//! from a build file yields a [`RuleInstance`]: a validated attribute map registered under the
//! label key `dir(build file)/name`.

mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;

use crate::action::ActionError;
use crate::action::context::BuildContext;
use crate::attr::{AttrDescriptor, AttrError, AttrType, AttrValue};
use crate::consts::NAME_ATTR;
use crate::label;
use crate::value::Value;

pub use registry::{RuleRegistry, SharedRegistry};

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.]+$").expect("valid rule name pattern"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
  #[error("name cannot be an attribute")]
  NameRedeclared,

  #[error("invalid rule implementation: {0}")]
  InvalidImplementation(String),

  #[error("unexpected attribute: {0}")]
  UnexpectedAttribute(String),

  #[error("missing mandatory attribute: {0}")]
  MissingMandatory(String),

  #[error("invalid name: {0:?}")]
  InvalidName(String),

  #[error("duplicate rule registered: {0}")]
  Duplicate(String),

  #[error("rule called with {0} positional arguments, want 0")]
  PositionalArguments(usize),

  #[error("rule instantiated outside of a build file")]
  OutsideBuildFile,

  #[error(transparent)]
  Attr(#[from] AttrError),
}

/// Something invocable with a build context, producing a value or failing.
pub trait RuleImpl: Send + Sync {
  fn invoke(&self, ctx: &BuildContext) -> Result<Value, ActionError>;
}

impl<F> RuleImpl for F
where
  F: Fn(&BuildContext) -> Result<Value, ActionError> + Send + Sync,
{
  fn invoke(&self, ctx: &BuildContext) -> Result<Value, ActionError> {
    self(ctx)
  }
}

/// A frozen, reusable rule: implementation plus attribute schema.
pub struct RuleDefinition {
  implementation: Arc<dyn RuleImpl>,
  attrs: BTreeMap<String, AttrDescriptor>,
}

impl RuleDefinition {
  /// Create a definition, injecting the mandatory `name` attribute.
  pub fn new(implementation: Arc<dyn RuleImpl>, mut attrs: BTreeMap<String, AttrDescriptor>) -> Result<Self, RuleError> {
    if attrs.contains_key(NAME_ATTR) {
      return Err(RuleError::NameRedeclared);
    }

    let name = AttrDescriptor::builder(AttrType::String)
      .doc("Name of rule")
      .mandatory(true)
      .build()?;
    attrs.insert(NAME_ATTR.to_string(), name);

    Ok(Self { implementation, attrs })
  }

  pub fn attr(&self, name: &str) -> Option<&AttrDescriptor> {
    self.attrs.get(name)
  }

  pub fn attrs(&self) -> &BTreeMap<String, AttrDescriptor> {
    &self.attrs
  }

  pub fn implementation(&self) -> &Arc<dyn RuleImpl> {
    &self.implementation
  }

  /// Validate `kwargs` against the schema and produce an instance for a build file located at
  /// the root-relative path `build_file`.
  ///
  /// Supplied values are type and value checked, omitted optional attributes receive their
  /// defaults, and omitted mandatory ones fail.
  pub fn instantiate(
    self: &Arc<Self>,
    build_file: &str,
    mut kwargs: BTreeMap<String, AttrValue>,
  ) -> Result<RuleInstance, RuleError> {
    for (name, value) in &kwargs {
      let descriptor = self
        .attrs
        .get(name)
        .ok_or_else(|| RuleError::UnexpectedAttribute(name.clone()))?;
      descriptor.check(name, value)?;
    }

    let mut attrs = BTreeMap::new();
    for (name, descriptor) in &self.attrs {
      let value = match kwargs.remove(name) {
        Some(value) => value,
        None if descriptor.mandatory() => return Err(RuleError::MissingMandatory(name.clone())),
        None => descriptor.default_value().clone(),
      };
      attrs.insert(name.clone(), value);
    }

    let name = attrs
      .get(NAME_ATTR)
      .and_then(AttrValue::as_str)
      .ok_or_else(|| RuleError::MissingMandatory(NAME_ATTR.to_string()))?;
    if !NAME_PATTERN.is_match(name) || name == "." || name == ".." {
      return Err(RuleError::InvalidName(name.to_string()));
    }

    let dir = label::dirname(build_file);
    Ok(RuleInstance {
      key: label::join(&dir, name),
      dir,
      build_file: build_file.to_string(),
      rule: Arc::clone(self),
      attrs,
    })
  }
}

impl fmt::Debug for RuleDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RuleDefinition").field("attrs", &self.attrs).finish_non_exhaustive()
  }
}

/// A concrete, fully attributed invocation of a rule.
#[derive(Debug, Clone)]
pub struct RuleInstance {
  key: String,
  dir: String,
  build_file: String,
  rule: Arc<RuleDefinition>,
  attrs: BTreeMap<String, AttrValue>,
}

impl RuleInstance {
  /// Root-relative path this instance is registered under.
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Directory of the declaring build file; relative labels resolve against it.
  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn build_file(&self) -> &str {
    &self.build_file
  }

  pub fn name(&self) -> &str {
    self.attrs.get(NAME_ATTR).and_then(AttrValue::as_str).unwrap_or_default()
  }

  pub fn rule(&self) -> &Arc<RuleDefinition> {
    &self.rule
  }

  pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
    &self.attrs
  }
}
