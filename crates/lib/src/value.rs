//! Interpreter-independent action results.

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::path::Path;

use serde::Serialize;

use crate::attr::AttrValue;
use crate::label;

/// A value produced by an action, or passed to one through its build context.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
  #[default]
  Nil,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  List(Vec<Value>),
  Map(BTreeMap<String, Value>),
  File(FileInfo),
  Target(Box<Target>),
}

impl Value {
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Nil => "nil",
      Value::Bool(_) => "bool",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::String(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
      Value::File(_) => "file",
      Value::Target(_) => "target",
    }
  }

  pub fn is_nil(&self) -> bool {
    matches!(self, Value::Nil)
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_file(&self) -> Option<&FileInfo> {
    match self {
      Value::File(f) => Some(f),
      _ => None,
    }
  }

  pub fn as_target(&self) -> Option<&Target> {
    match self {
      Value::Target(t) => Some(t),
      _ => None,
    }
  }
}

impl From<&AttrValue> for Value {
  fn from(value: &AttrValue) -> Self {
    let strings = |v: &[String]| Value::List(v.iter().cloned().map(Value::String).collect());
    match value {
      AttrValue::Bool(b) => Value::Bool(*b),
      AttrValue::Int(i) => Value::Int(*i),
      AttrValue::IntList(v) => Value::List(v.iter().copied().map(Value::Int).collect()),
      AttrValue::Label(s) | AttrValue::Output(s) | AttrValue::String(s) => Value::String(s.clone()),
      AttrValue::LabelList(v) | AttrValue::OutputList(v) | AttrValue::StringList(v) => strings(v),
    }
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Value::String(s)
  }
}

impl From<FileInfo> for Value {
  fn from(f: FileInfo) -> Self {
    Value::File(f)
  }
}

/// Metadata of a file, as produced by file-reference actions and the file capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
  pub basename: String,
  pub dirname: String,
  pub extension: String,
  pub path: String,
  pub is_directory: bool,
  pub size: u64,
}

impl FileInfo {
  /// Describe the file at `fs_path`, addressed in the build as `key`.
  ///
  /// `dirname` is taken from the key, `path` is the absolute filesystem path.
  pub fn from_metadata(key: &str, fs_path: &Path, meta: &Metadata) -> Self {
    let name = fs_path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| label::basename(key).to_string());
    let path = std::path::absolute(fs_path).unwrap_or_else(|_| fs_path.to_path_buf());

    Self {
      extension: label::extension(&name).to_string(),
      basename: name,
      dirname: label::dirname(key),
      path: path.to_string_lossy().into_owned(),
      is_directory: meta.is_dir(),
      size: meta.len(),
    }
  }
}

/// A resolved label attribute: the dependency's label and what it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
  pub label: String,
  pub value: Value,
}
