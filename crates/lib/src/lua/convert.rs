//! Conversions between Lua values and engine types, including errors.

use std::collections::BTreeMap;
use std::ffi::c_void;

use mlua::prelude::*;

use crate::action::ActionError;
use crate::attr::AttrError;
use crate::eval::EvalError;
use crate::rule::RuleError;
use crate::value::Value;

/// Convert a build value into Lua. Maps and records become tables, `Nil` becomes `nil`.
pub fn value_to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
  let options = LuaSerializeOptions::new()
    .serialize_none_to_null(false)
    .serialize_unit_to_null(false);
  lua.to_value_with(value, options)
}

/// Tables nested deeper than this are rejected instead of exhausting the worker's stack.
const MAX_TABLE_DEPTH: usize = 128;

/// Convert a Lua value produced by a rule implementation into a build value.
///
/// Tables whose keys are exactly `1..=n` become lists, other tables must have string keys and
/// become maps. Functions, userdata and threads have no build representation, and a table
/// that contains itself is an error.
pub fn lua_to_value(value: &LuaValue) -> LuaResult<Value> {
  convert(value, &mut Vec::new())
}

fn convert(value: &LuaValue, ancestors: &mut Vec<*const c_void>) -> LuaResult<Value> {
  match value {
    LuaValue::Nil => Ok(Value::Nil),
    LuaValue::Boolean(b) => Ok(Value::Bool(*b)),
    LuaValue::Integer(i) => Ok(Value::Int(*i)),
    LuaValue::Number(n) => Ok(Value::Float(*n)),
    LuaValue::String(s) => Ok(Value::String(s.to_str()?.to_string())),
    LuaValue::Table(table) => {
      let ptr = table.to_pointer();
      if ancestors.contains(&ptr) {
        return Err(LuaError::external("cannot convert a table that contains itself"));
      }
      if ancestors.len() >= MAX_TABLE_DEPTH {
        return Err(LuaError::external(format!(
          "cannot convert tables nested more than {} deep",
          MAX_TABLE_DEPTH
        )));
      }
      ancestors.push(ptr);
      let result = table_to_value(table, ancestors);
      ancestors.pop();
      result
    }
    other => Err(LuaError::external(format!(
      "cannot convert {} to a build value",
      other.type_name()
    ))),
  }
}

fn table_to_value(table: &LuaTable, ancestors: &mut Vec<*const c_void>) -> LuaResult<Value> {
  let len = table.raw_len();
  let pairs = table.pairs::<LuaValue, LuaValue>().collect::<LuaResult<Vec<_>>>()?;

  if pairs.len() == len {
    let mut items = Vec::with_capacity(len);
    for i in 1..=len {
      items.push(convert(&table.raw_get::<LuaValue>(i)?, ancestors)?);
    }
    return Ok(Value::List(items));
  }

  let mut map = BTreeMap::new();
  for (key, value) in pairs {
    let LuaValue::String(key) = key else {
      return Err(LuaError::external(format!(
        "table keys must be strings, got {}",
        key.type_name()
      )));
    };
    map.insert(key.to_str()?.to_string(), convert(&value, ancestors)?);
  }
  Ok(Value::Map(map))
}

/// The error behind callback and context wrappers.
fn root_cause(err: &LuaError) -> &LuaError {
  match err {
    LuaError::CallbackError { cause, .. } | LuaError::WithContext { cause, .. } => root_cause(cause),
    other => other,
  }
}

fn message(err: &LuaError) -> String {
  match err {
    LuaError::RuntimeError(msg) => msg.split("\nstack traceback:").next().unwrap_or(msg).to_string(),
    LuaError::SyntaxError { message, .. } => message.clone(),
    other => other.to_string(),
  }
}

/// Recover the engine error raised inside a build file, if any.
pub fn eval_error(err: &LuaError) -> EvalError {
  let cause = root_cause(err);
  if let LuaError::ExternalError(inner) = cause {
    if let Some(e) = inner.downcast_ref::<RuleError>() {
      return e.clone().into();
    }
    if let Some(e) = inner.downcast_ref::<AttrError>() {
      return e.clone().into();
    }
    if let Some(e) = inner.downcast_ref::<EvalError>() {
      return e.clone();
    }
  }
  EvalError::Script(message(cause))
}

/// Recover the action error raised inside a rule implementation, if any.
pub fn action_error(err: &LuaError) -> ActionError {
  let cause = root_cause(err);
  if let LuaError::ExternalError(inner) = cause
    && let Some(e) = inner.downcast_ref::<ActionError>()
  {
    return e.clone();
  }
  ActionError::Failed(message(cause))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::{FileInfo, Target};

  #[test]
  fn sequences_become_lists() -> LuaResult<()> {
    let lua = Lua::new();
    let value: LuaValue = lua.load("return { 1, 'two', true }").eval()?;
    assert_eq!(
      lua_to_value(&value)?,
      Value::List(vec![Value::Int(1), Value::String("two".into()), Value::Bool(true)])
    );
    Ok(())
  }

  #[test]
  fn records_become_maps() -> LuaResult<()> {
    let lua = Lua::new();
    let value: LuaValue = lua.load("return { out = 'bin/hello', size = 1.5 }").eval()?;
    let Value::Map(map) = lua_to_value(&value)? else {
      panic!("expected map");
    };
    assert_eq!(map["out"], Value::String("bin/hello".into()));
    assert_eq!(map["size"], Value::Float(1.5));
    Ok(())
  }

  #[test]
  fn functions_are_rejected() -> LuaResult<()> {
    let lua = Lua::new();
    let value: LuaValue = lua.load("return { f = function() end }").eval()?;
    assert!(lua_to_value(&value).is_err());
    Ok(())
  }

  #[test]
  fn self_referencing_tables_are_rejected() -> LuaResult<()> {
    let lua = Lua::new();
    let value: LuaValue = lua.load("local t = { x = 1 } t.self = t return t").eval()?;
    let err = lua_to_value(&value).unwrap_err();
    assert!(err.to_string().contains("contains itself"), "{}", err);

    let value: LuaValue = lua.load("local t = {} local u = { t } t[1] = u return { t }").eval()?;
    assert!(lua_to_value(&value).is_err());
    Ok(())
  }

  #[test]
  fn shared_tables_are_not_cycles() -> LuaResult<()> {
    let lua = Lua::new();
    let value: LuaValue = lua.load("local shared = { 1 } return { a = shared, b = shared }").eval()?;
    let Value::Map(map) = lua_to_value(&value)? else {
      panic!("expected map");
    };
    assert_eq!(map["a"], map["b"]);
    Ok(())
  }

  #[test]
  fn deep_nesting_is_rejected() -> LuaResult<()> {
    let lua = Lua::new();
    let value: LuaValue = lua
      .load("local t = {} for _ = 1, 10000 do t = { t } end return t")
      .eval()?;
    let err = lua_to_value(&value).unwrap_err();
    assert!(err.to_string().contains("nested"), "{}", err);
    Ok(())
  }

  #[test]
  fn targets_are_visible_as_tables() -> LuaResult<()> {
    let lua = Lua::new();
    let target = Value::Target(Box::new(Target {
      label: "file://src/main.go".into(),
      value: Value::File(FileInfo {
        basename: "main.go".into(),
        dirname: "src".into(),
        extension: ".go".into(),
        path: "/work/src/main.go".into(),
        is_directory: false,
        size: 42,
      }),
    }));
    lua.globals().set("dep", value_to_lua(&lua, &target)?)?;

    let (label, ext, size): (String, String, i64) = lua
      .load("return dep.label, dep.value.extension, dep.value.size")
      .eval()?;
    assert_eq!(label, "file://src/main.go");
    assert_eq!(ext, ".go");
    assert_eq!(size, 42);

    assert!(value_to_lua(&lua, &Value::Nil)?.is_nil());
    Ok(())
  }

  #[test]
  fn engine_errors_survive_callbacks() -> LuaResult<()> {
    let lua = Lua::new();
    let raise = lua.create_function(|_, ()| -> LuaResult<()> {
      Err(LuaError::external(RuleError::MissingMandatory("srcs".into())))
    })?;
    lua.globals().set("raise", raise)?;

    let err = lua.load("raise()").exec().unwrap_err();
    assert_eq!(eval_error(&err), EvalError::Rule(RuleError::MissingMandatory("srcs".into())));
    Ok(())
  }

  #[test]
  fn script_errors_keep_their_message() {
    let lua = Lua::new();
    let err = lua.load("error('boom')").exec().unwrap_err();
    let EvalError::Script(msg) = eval_error(&err) else {
      panic!("expected script error");
    };
    assert!(msg.contains("boom"), "{}", msg);
  }

  #[test]
  fn action_errors_survive_callbacks() -> LuaResult<()> {
    let lua = Lua::new();
    let raise = lua.create_function(|_, ()| -> LuaResult<()> { Err(LuaError::external(ActionError::Cancelled)) })?;
    let err = raise.call::<()>(()).unwrap_err();
    assert_eq!(action_error(&err), ActionError::Cancelled);

    let err = lua.load("error('compile failed', 0)").exec().unwrap_err();
    assert_eq!(action_error(&err), ActionError::Failed("compile failed".into()));
    Ok(())
  }
}
