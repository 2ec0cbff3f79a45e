//! Typed rule attributes.
//!
//! Every rule declares its attributes up front as [`AttrDescriptor`]s. A descriptor fixes the
//! attribute's [`AttrType`] and carries the options that govern instantiation: a default,
//! whether the attribute is mandatory, and value constraints. Descriptors are immutable once
//! built.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttrError {
  #[error("invalid field {attr}({expected}): got {got}")]
  TypeMismatch {
    attr: String,
    expected: AttrType,
    got: String,
  },

  #[error("invalid value for {attr}: {value} is not one of [{allowed}]")]
  ValueNotAllowed {
    attr: String,
    value: String,
    allowed: String,
  },

  #[error("attribute {attr} must not be empty")]
  EmptyNotAllowed { attr: String },

  #[error("{ty} does not accept option '{option}'")]
  UnknownOption { ty: AttrType, option: String },

  #[error("invalid option '{option}' for {ty}: {reason}")]
  InvalidOption {
    ty: AttrType,
    option: String,
    reason: String,
  },

  #[error("unsupported attribute type: {0}")]
  Unsupported(AttrType),
}

/// The type tag of an attribute.
///
/// The dictionary types are recognized so build files naming them fail with a clear message,
/// but no descriptor can be built for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
  Bool,
  Int,
  IntList,
  Label,
  LabelList,
  Output,
  OutputList,
  String,
  StringList,
  LabelKeyedStringDict,
  StringDict,
  StringListDict,
}

impl AttrType {
  /// Every type, in the order the build language exposes its constructors.
  pub const ALL: [AttrType; 12] = [
    AttrType::Bool,
    AttrType::Int,
    AttrType::IntList,
    AttrType::Label,
    AttrType::LabelList,
    AttrType::Output,
    AttrType::OutputList,
    AttrType::String,
    AttrType::StringList,
    AttrType::LabelKeyedStringDict,
    AttrType::StringDict,
    AttrType::StringListDict,
  ];

  /// Constructor name under the `attr` table (`attr.string_list`).
  pub fn name(&self) -> &'static str {
    match self {
      AttrType::Bool => "bool",
      AttrType::Int => "int",
      AttrType::IntList => "int_list",
      AttrType::Label => "label",
      AttrType::LabelList => "label_list",
      AttrType::Output => "output",
      AttrType::OutputList => "output_list",
      AttrType::String => "string",
      AttrType::StringList => "string_list",
      AttrType::LabelKeyedStringDict => "label_keyed_string_dict",
      AttrType::StringDict => "string_dict",
      AttrType::StringListDict => "string_list_dict",
    }
  }

  pub fn is_supported(&self) -> bool {
    !matches!(
      self,
      AttrType::LabelKeyedStringDict | AttrType::StringDict | AttrType::StringListDict
    )
  }

  pub fn is_list(&self) -> bool {
    matches!(
      self,
      AttrType::IntList | AttrType::LabelList | AttrType::OutputList | AttrType::StringList
    )
  }

  fn is_output(&self) -> bool {
    matches!(self, AttrType::Output | AttrType::OutputList)
  }

  fn is_label(&self) -> bool {
    matches!(self, AttrType::Label | AttrType::LabelList)
  }

  /// Whether an enumeration of permitted values may be given, and of which kind.
  fn values_kind(&self) -> Option<ValuesKind> {
    match self {
      AttrType::Int | AttrType::IntList => Some(ValuesKind::Ints),
      AttrType::String | AttrType::StringList | AttrType::Label => Some(ValuesKind::Strings),
      _ => None,
    }
  }

  /// Option names this type accepts at declaration.
  pub fn options(&self) -> &'static [&'static str] {
    match self {
      AttrType::Bool => &["default", "doc", "mandatory"],
      AttrType::Int | AttrType::String => &["default", "doc", "mandatory", "values"],
      AttrType::IntList | AttrType::StringList => &["default", "doc", "mandatory", "allow_empty", "values"],
      AttrType::Label => &["default", "doc", "mandatory", "values", "allow_files", "executable"],
      AttrType::LabelList => &["default", "doc", "mandatory", "allow_empty", "allow_files"],
      AttrType::Output => &["doc", "mandatory"],
      AttrType::OutputList => &["doc", "mandatory", "allow_empty"],
      AttrType::LabelKeyedStringDict | AttrType::StringDict | AttrType::StringListDict => &[],
    }
  }
}

impl fmt::Display for AttrType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "attr.{}", self.name())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValuesKind {
  Ints,
  Strings,
}

/// An attribute value. The variant always agrees with the declared [`AttrType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
  Bool(bool),
  Int(i64),
  IntList(Vec<i64>),
  Label(String),
  LabelList(Vec<String>),
  Output(String),
  OutputList(Vec<String>),
  String(String),
  StringList(Vec<String>),
}

impl AttrValue {
  /// The zero value of `ty`, used when an optional attribute has no explicit default.
  pub fn zero(ty: AttrType) -> Option<AttrValue> {
    let value = match ty {
      AttrType::Bool => AttrValue::Bool(false),
      AttrType::Int => AttrValue::Int(0),
      AttrType::IntList => AttrValue::IntList(Vec::new()),
      AttrType::Label => AttrValue::Label(String::new()),
      AttrType::LabelList => AttrValue::LabelList(Vec::new()),
      AttrType::Output => AttrValue::Output(String::new()),
      AttrType::OutputList => AttrValue::OutputList(Vec::new()),
      AttrType::String => AttrValue::String(String::new()),
      AttrType::StringList => AttrValue::StringList(Vec::new()),
      AttrType::LabelKeyedStringDict | AttrType::StringDict | AttrType::StringListDict => return None,
    };
    Some(value)
  }

  pub fn attr_type(&self) -> AttrType {
    match self {
      AttrValue::Bool(_) => AttrType::Bool,
      AttrValue::Int(_) => AttrType::Int,
      AttrValue::IntList(_) => AttrType::IntList,
      AttrValue::Label(_) => AttrType::Label,
      AttrValue::LabelList(_) => AttrType::LabelList,
      AttrValue::Output(_) => AttrType::Output,
      AttrValue::OutputList(_) => AttrType::OutputList,
      AttrValue::String(_) => AttrType::String,
      AttrValue::StringList(_) => AttrType::StringList,
    }
  }

  /// `Some(true)` for an empty list, `None` for scalars.
  pub fn is_empty_list(&self) -> Option<bool> {
    match self {
      AttrValue::IntList(v) => Some(v.is_empty()),
      AttrValue::LabelList(v) | AttrValue::OutputList(v) | AttrValue::StringList(v) => Some(v.is_empty()),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      AttrValue::Label(s) | AttrValue::Output(s) | AttrValue::String(s) => Some(s),
      _ => None,
    }
  }
}

impl fmt::Display for AttrValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AttrValue::Bool(b) => write!(f, "{}", b),
      AttrValue::Int(i) => write!(f, "{}", i),
      AttrValue::IntList(v) => write!(f, "{:?}", v),
      AttrValue::Label(s) | AttrValue::Output(s) | AttrValue::String(s) => write!(f, "{:?}", s),
      AttrValue::LabelList(v) | AttrValue::OutputList(v) | AttrValue::StringList(v) => write!(f, "{:?}", v),
    }
  }
}

/// Whether a label attribute may resolve to a plain file rather than a rule instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowFiles {
  #[default]
  No,
  Any,
  /// Only files whose name ends in one of these suffixes (`.go`, `.c`).
  Extensions(Vec<String>),
}

impl AllowFiles {
  pub fn permits(&self, file_name: &str) -> bool {
    match self {
      AllowFiles::No => false,
      AllowFiles::Any => true,
      AllowFiles::Extensions(exts) => exts.iter().any(|ext| file_name.ends_with(ext.as_str())),
    }
  }
}

/// Enumeration of permitted values for an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedValues {
  Ints(Vec<i64>),
  Strings(Vec<String>),
}

impl AllowedValues {
  fn kind(&self) -> ValuesKind {
    match self {
      AllowedValues::Ints(_) => ValuesKind::Ints,
      AllowedValues::Strings(_) => ValuesKind::Strings,
    }
  }

  fn check(&self, attr: &str, value: &AttrValue) -> Result<(), AttrError> {
    let not_allowed = |value: String| AttrError::ValueNotAllowed {
      attr: attr.to_string(),
      value,
      allowed: self.to_string(),
    };

    match (self, value) {
      (AllowedValues::Ints(allowed), AttrValue::Int(i)) => {
        if !allowed.contains(i) {
          return Err(not_allowed(i.to_string()));
        }
      }
      (AllowedValues::Ints(allowed), AttrValue::IntList(list)) => {
        if let Some(i) = list.iter().find(|i| !allowed.contains(i)) {
          return Err(not_allowed(i.to_string()));
        }
      }
      (AllowedValues::Strings(allowed), AttrValue::String(s) | AttrValue::Label(s)) => {
        if !allowed.contains(s) {
          return Err(not_allowed(format!("{:?}", s)));
        }
      }
      (AllowedValues::Strings(allowed), AttrValue::StringList(list)) => {
        if let Some(s) = list.iter().find(|s| !allowed.contains(s)) {
          return Err(not_allowed(format!("{:?}", s)));
        }
      }
      _ => {}
    }
    Ok(())
  }
}

impl fmt::Display for AllowedValues {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let items: Vec<String> = match self {
      AllowedValues::Ints(v) => v.iter().map(|i| i.to_string()).collect(),
      AllowedValues::Strings(v) => v.iter().map(|s| format!("{:?}", s)).collect(),
    };
    write!(f, "{}", items.join(", "))
  }
}

/// An immutable attribute declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrDescriptor {
  ty: AttrType,
  default: AttrValue,
  doc: String,
  mandatory: bool,
  allow_empty: bool,
  executable: bool,
  allow_files: AllowFiles,
  values: Option<AllowedValues>,
}

impl AttrDescriptor {
  pub fn builder(ty: AttrType) -> AttrDescriptorBuilder {
    AttrDescriptorBuilder {
      ty,
      default: None,
      doc: String::new(),
      mandatory: false,
      allow_empty: None,
      executable: false,
      allow_files: AllowFiles::No,
      values: None,
    }
  }

  pub fn attr_type(&self) -> AttrType {
    self.ty
  }

  pub fn default_value(&self) -> &AttrValue {
    &self.default
  }

  pub fn doc(&self) -> &str {
    &self.doc
  }

  pub fn mandatory(&self) -> bool {
    self.mandatory
  }

  pub fn allow_empty(&self) -> bool {
    self.allow_empty
  }

  pub fn executable(&self) -> bool {
    self.executable
  }

  pub fn allow_files(&self) -> &AllowFiles {
    &self.allow_files
  }

  pub fn values(&self) -> Option<&AllowedValues> {
    self.values.as_ref()
  }

  /// Validate a supplied value for the attribute called `attr`.
  pub fn check(&self, attr: &str, value: &AttrValue) -> Result<(), AttrError> {
    check_type(self.ty, attr, value)?;
    if !self.allow_empty && value.is_empty_list() == Some(true) {
      return Err(AttrError::EmptyNotAllowed { attr: attr.to_string() });
    }
    if let Some(values) = &self.values {
      values.check(attr, value)?;
    }
    Ok(())
  }
}

impl fmt::Display for AttrDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.ty)?;
    if self.mandatory {
      write!(f, "(mandatory)")?;
    } else {
      write!(f, "(default={})", self.default)?;
    }
    Ok(())
  }
}

fn check_type(ty: AttrType, attr: &str, value: &AttrValue) -> Result<(), AttrError> {
  if value.attr_type() == ty {
    Ok(())
  } else {
    Err(AttrError::TypeMismatch {
      attr: attr.to_string(),
      expected: ty,
      got: value.attr_type().to_string(),
    })
  }
}

/// Collects options for an [`AttrDescriptor`]; [`build`](Self::build) validates them.
#[derive(Debug, Clone)]
pub struct AttrDescriptorBuilder {
  ty: AttrType,
  default: Option<AttrValue>,
  doc: String,
  mandatory: bool,
  allow_empty: Option<bool>,
  executable: bool,
  allow_files: AllowFiles,
  values: Option<AllowedValues>,
}

impl AttrDescriptorBuilder {
  pub fn default_value(mut self, value: AttrValue) -> Self {
    self.default = Some(value);
    self
  }

  pub fn doc(mut self, doc: impl Into<String>) -> Self {
    self.doc = doc.into();
    self
  }

  pub fn mandatory(mut self, mandatory: bool) -> Self {
    self.mandatory = mandatory;
    self
  }

  pub fn allow_empty(mut self, allow_empty: bool) -> Self {
    self.allow_empty = Some(allow_empty);
    self
  }

  pub fn executable(mut self, executable: bool) -> Self {
    self.executable = executable;
    self
  }

  pub fn allow_files(mut self, allow_files: AllowFiles) -> Self {
    self.allow_files = allow_files;
    self
  }

  pub fn values(mut self, values: AllowedValues) -> Self {
    self.values = Some(values);
    self
  }

  pub fn build(self) -> Result<AttrDescriptor, AttrError> {
    let ty = self.ty;
    if !ty.is_supported() {
      return Err(AttrError::Unsupported(ty));
    }

    let unknown = |option: &str| AttrError::UnknownOption {
      ty,
      option: option.to_string(),
    };

    if self.default.is_some() && ty.is_output() {
      return Err(unknown("default"));
    }
    if self.allow_empty.is_some() && !ty.is_list() {
      return Err(unknown("allow_empty"));
    }
    if self.executable && ty != AttrType::Label {
      return Err(unknown("executable"));
    }
    if self.allow_files != AllowFiles::No && !ty.is_label() {
      return Err(unknown("allow_files"));
    }
    if let Some(values) = &self.values {
      match ty.values_kind() {
        None => return Err(unknown("values")),
        Some(kind) if kind != values.kind() => {
          return Err(AttrError::InvalidOption {
            ty,
            option: "values".to_string(),
            reason: format!("expected a list of {}", if kind == ValuesKind::Ints { "ints" } else { "strings" }),
          });
        }
        Some(_) => {}
      }
    }

    let default = match self.default {
      Some(value) => {
        check_type(ty, "default", &value)?;
        value
      }
      None => AttrValue::zero(ty).ok_or(AttrError::Unsupported(ty))?,
    };

    Ok(AttrDescriptor {
      ty,
      default,
      doc: self.doc,
      mandatory: self.mandatory,
      allow_empty: self.allow_empty.unwrap_or(true),
      executable: self.executable,
      allow_files: self.allow_files,
      values: self.values,
    })
  }
}
