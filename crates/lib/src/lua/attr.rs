//! The `attr` constructor table and Lua-to-attribute conversions.
//!
//! `attr.string{ default = "x", values = { "x", "y" } }` builds an immutable
//! [`AttrDescriptor`] wrapped in [`LuaAttr`] userdata. Options are validated against the type
//! when the constructor runs.

use std::sync::Arc;

use mlua::prelude::*;

use super::convert::value_to_lua;
use crate::attr::{AllowFiles, AllowedValues, AttrDescriptor, AttrError, AttrType, AttrValue};
use crate::value::Value;

/// An attribute descriptor as seen from Lua. Its fields are readable, never writable.
#[derive(Debug, Clone)]
pub struct LuaAttr(pub Arc<AttrDescriptor>);

impl LuaUserData for LuaAttr {
  fn add_fields<F: LuaUserDataFields<Self>>(fields: &mut F) {
    fields.add_field_method_get("type", |_, this| Ok(this.0.attr_type().name()));
    fields.add_field_method_get("doc", |_, this| Ok(this.0.doc().to_string()));
    fields.add_field_method_get("mandatory", |_, this| Ok(this.0.mandatory()));
    fields.add_field_method_get("default", |lua, this| {
      value_to_lua(lua, &Value::from(this.0.default_value()))
    });
  }

  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| Ok(this.0.to_string()));
  }
}

/// Create the `attr` table with one constructor per attribute type.
pub fn create_attr_table(lua: &Lua) -> LuaResult<LuaTable> {
  let table = lua.create_table()?;
  for ty in AttrType::ALL {
    let constructor = lua.create_function(move |_, options: Option<LuaTable>| {
      let descriptor = descriptor_from_lua(ty, options.as_ref()).map_err(LuaError::external)?;
      Ok(LuaAttr(Arc::new(descriptor)))
    })?;
    table.set(ty.name(), constructor)?;
  }
  Ok(table)
}

/// Build a descriptor of type `ty` from a constructor's option table.
pub fn descriptor_from_lua(ty: AttrType, options: Option<&LuaTable>) -> Result<AttrDescriptor, AttrError> {
  if !ty.is_supported() {
    return Err(AttrError::Unsupported(ty));
  }

  let mut builder = AttrDescriptor::builder(ty);
  let Some(options) = options else {
    return builder.build();
  };

  for pair in options.pairs::<LuaValue, LuaValue>() {
    let (key, value) = pair.map_err(|e| invalid(ty, "?", e.to_string()))?;
    let LuaValue::String(key) = key else {
      return Err(invalid(ty, &key.type_name().to_string(), "option names must be strings"));
    };
    let key = key.to_string_lossy().to_string();
    if !ty.options().contains(&key.as_str()) {
      return Err(AttrError::UnknownOption { ty, option: key });
    }

    builder = match key.as_str() {
      "default" => builder.default_value(attr_value_from_lua(ty, "default", &value)?),
      "doc" => match &value {
        LuaValue::String(s) => builder.doc(s.to_string_lossy().to_string()),
        other => return Err(invalid(ty, &key, format!("expected a string, got {}", other.type_name()))),
      },
      "mandatory" => builder.mandatory(option_bool(ty, &key, &value)?),
      "allow_empty" => builder.allow_empty(option_bool(ty, &key, &value)?),
      "executable" => builder.executable(option_bool(ty, &key, &value)?),
      "allow_files" => builder.allow_files(allow_files_from_lua(ty, &value)?),
      "values" => builder.values(values_from_lua(ty, &value)?),
      _ => return Err(AttrError::UnknownOption { ty, option: key }),
    };
  }

  builder.build()
}

/// Convert a Lua value supplied for attribute `attr` of type `ty`.
///
/// The Lua representation must match exactly: integers for `int`, sequences for lists, and
/// so on. Floats are never truncated and scalars are never wrapped into lists.
pub fn attr_value_from_lua(ty: AttrType, attr: &str, value: &LuaValue) -> Result<AttrValue, AttrError> {
  let mismatch = |got: String| AttrError::TypeMismatch {
    attr: attr.to_string(),
    expected: ty,
    got,
  };
  let scalar = |v: Option<AttrValue>| v.ok_or_else(|| mismatch(value.type_name().to_string()));

  match ty {
    AttrType::Bool => scalar(match value {
      LuaValue::Boolean(b) => Some(AttrValue::Bool(*b)),
      _ => None,
    }),
    AttrType::Int => scalar(integer(value).map(AttrValue::Int)),
    AttrType::String => scalar(string(value).map(AttrValue::String)),
    AttrType::Label => scalar(string(value).map(AttrValue::Label)),
    AttrType::Output => scalar(string(value).map(AttrValue::Output)),
    AttrType::IntList => list(value, integer).map(AttrValue::IntList).map_err(mismatch),
    AttrType::LabelList => list(value, string).map(AttrValue::LabelList).map_err(mismatch),
    AttrType::OutputList => list(value, string).map(AttrValue::OutputList).map_err(mismatch),
    AttrType::StringList => list(value, string).map(AttrValue::StringList).map_err(mismatch),
    AttrType::LabelKeyedStringDict | AttrType::StringDict | AttrType::StringListDict => Err(AttrError::Unsupported(ty)),
  }
}

fn integer(value: &LuaValue) -> Option<i64> {
  match value {
    LuaValue::Integer(i) => Some(*i),
    _ => None,
  }
}

fn string(value: &LuaValue) -> Option<String> {
  match value {
    LuaValue::String(s) => s.to_str().ok().map(|s| s.to_string()),
    _ => None,
  }
}

/// The elements of a Lua sequence, or `None` if `value` is not one.
pub(crate) fn sequence(value: &LuaValue) -> Option<Vec<LuaValue>> {
  let LuaValue::Table(table) = value else {
    return None;
  };
  let len = table.raw_len();
  if table.pairs::<LuaValue, LuaValue>().count() != len {
    return None;
  }
  (1..=len).map(|i| table.raw_get::<LuaValue>(i).ok()).collect()
}

/// Convert every element of a sequence, reporting what was found on mismatch.
fn list<T>(value: &LuaValue, item: impl Fn(&LuaValue) -> Option<T>) -> Result<Vec<T>, String> {
  let items = sequence(value).ok_or_else(|| value.type_name().to_string())?;
  items
    .iter()
    .map(|v| item(v).ok_or_else(|| format!("list containing {}", v.type_name())))
    .collect()
}

fn option_bool(ty: AttrType, option: &str, value: &LuaValue) -> Result<bool, AttrError> {
  match value {
    LuaValue::Boolean(b) => Ok(*b),
    other => Err(invalid(ty, option, format!("expected a boolean, got {}", other.type_name()))),
  }
}

/// `false` allows no files, `true` any file, a list of suffixes only matching files.
fn allow_files_from_lua(ty: AttrType, value: &LuaValue) -> Result<AllowFiles, AttrError> {
  match value {
    LuaValue::Boolean(false) => Ok(AllowFiles::No),
    LuaValue::Boolean(true) => Ok(AllowFiles::Any),
    other => list(other, string)
      .map(AllowFiles::Extensions)
      .map_err(|got| invalid(ty, "allow_files", format!("expected a boolean or a list of extensions, got {}", got))),
  }
}

fn values_from_lua(ty: AttrType, value: &LuaValue) -> Result<AllowedValues, AttrError> {
  let values = match ty {
    AttrType::Int | AttrType::IntList => list(value, integer).map(AllowedValues::Ints),
    _ => list(value, string).map(AllowedValues::Strings),
  };
  values.map_err(|got| invalid(ty, "values", format!("expected a list, got {}", got)))
}

fn invalid(ty: AttrType, option: &str, reason: impl Into<String>) -> AttrError {
  AttrError::InvalidOption {
    ty,
    option: option.to_string(),
    reason: reason.into(),
  }
}
