//! `rule{}` and rule definitions as callable userdata.
//!
//! ```lua
//! go_binary = rule{
//!   impl = function(ctx) ... end,
//!   attrs = { srcs = attr.label_list{ allow_files = { ".go" } } },
//! }
//!
//! go_binary{ name = "hello", srcs = { "main.go" } }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use mlua::WeakLua;
use mlua::prelude::*;
use tokio::runtime::Handle;
use tracing::debug;

use super::attr::{LuaAttr, attr_value_from_lua};
use super::convert::{action_error, lua_to_value};
use super::ctx::context_to_lua;
use super::loaders::CURRENT_BUILD_FILE_KEY;
use crate::action::ActionError;
use crate::action::context::BuildContext;
use crate::attr::AttrDescriptor;
use crate::eval::EvalError;
use crate::rule::{RuleDefinition, RuleError, RuleImpl, SharedRegistry};
use crate::value::Value;

/// Registry key holding `debug.getinfo`, captured before the debug library is hidden.
pub(crate) const GETINFO_KEY: &str = "__laze_getinfo";

/// Store `debug.getinfo` in the registry and remove the debug library from scripts' reach.
pub(crate) fn capture_getinfo(lua: &Lua) -> LuaResult<()> {
  let debug_lib: LuaTable = lua.globals().get("debug")?;
  let getinfo: LuaFunction = debug_lib.get("getinfo")?;
  lua.set_named_registry_value(GETINFO_KEY, getinfo)?;

  lua.globals().set("debug", LuaValue::Nil)?;
  let loaded: LuaTable = lua.globals().get::<LuaTable>("package")?.get("loaded")?;
  loaded.set("debug", LuaValue::Nil)?;
  Ok(())
}

/// A Lua function used as a rule implementation.
struct LuaRuleImpl {
  lua: WeakLua,
  func: LuaFunction,
}

impl RuleImpl for LuaRuleImpl {
  fn invoke(&self, ctx: &BuildContext) -> Result<Value, ActionError> {
    let lua = self
      .lua
      .try_upgrade()
      .ok_or_else(|| ActionError::Failed("build language runtime was shut down".to_string()))?;
    let handle = Handle::try_current()
      .map_err(|_| ActionError::Failed("rule implementations require a tokio runtime".to_string()))?;
    let ctx = context_to_lua(&lua, ctx).map_err(|e| action_error(&e))?;
    // The state lock is released whenever an async action yields.
    let result: LuaValue = handle
      .block_on(self.func.call_async(ctx))
      .map_err(|e| action_error(&e))?;
    lua_to_value(&result).map_err(|e| action_error(&e))
  }
}

/// A rule definition as seen from Lua. Calling it with a keyword table instantiates the rule
/// in the build file being evaluated.
pub struct LuaRule {
  definition: Arc<RuleDefinition>,
  registry: SharedRegistry,
}

impl LuaUserData for LuaRule {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    methods.add_meta_method(LuaMetaMethod::Call, |lua, this, args: LuaMultiValue| {
      this.instantiate(lua, args)
    });

    methods.add_meta_method(LuaMetaMethod::ToString, |_, this, ()| {
      let names: Vec<&str> = this.definition.attrs().keys().map(String::as_str).collect();
      Ok(format!("rule({})", names.join(", ")))
    });
  }
}

impl LuaRule {
  fn instantiate(&self, lua: &Lua, args: LuaMultiValue) -> LuaResult<()> {
    let args: Vec<LuaValue> = args.into_iter().collect();
    let kwargs = match args.as_slice() {
      [] => lua.create_table()?,
      [LuaValue::Table(table)] => table.clone(),
      other => return Err(LuaError::external(RuleError::PositionalArguments(other.len()))),
    };

    let mut values = BTreeMap::new();
    let mut positional = 0;
    for pair in kwargs.pairs::<LuaValue, LuaValue>() {
      let (key, value) = pair?;
      let key = match key {
        LuaValue::String(s) => s.to_str()?.to_string(),
        LuaValue::Integer(_) => {
          positional += 1;
          continue;
        }
        other => {
          return Err(LuaError::external(EvalError::Script(format!(
            "attribute names must be strings, got {}",
            other.type_name()
          ))));
        }
      };

      let descriptor = self
        .definition
        .attr(&key)
        .ok_or_else(|| LuaError::external(RuleError::UnexpectedAttribute(key.clone())))?;
      let value = attr_value_from_lua(descriptor.attr_type(), &key, &value).map_err(LuaError::external)?;
      values.insert(key, value);
    }
    if positional > 0 {
      return Err(LuaError::external(RuleError::PositionalArguments(positional)));
    }

    let build_file: Option<String> = lua.named_registry_value(CURRENT_BUILD_FILE_KEY)?;
    let build_file = build_file.ok_or_else(|| LuaError::external(RuleError::OutsideBuildFile))?;

    let instance = self
      .definition
      .instantiate(&build_file, values)
      .map_err(LuaError::external)?;
    let instance = self.registry.lock().register(instance).map_err(LuaError::external)?;
    debug!(key = instance.key(), file = %build_file, "instantiated rule");
    Ok(())
  }
}

/// Create the global `rule` function. Definitions it returns register into `registry`.
pub fn create_rule_function(lua: &Lua, registry: SharedRegistry) -> LuaResult<LuaFunction> {
  lua.create_function(move |lua, fields: LuaTable| {
    let mut implementation = None;
    let mut attrs = BTreeMap::new();

    for pair in fields.pairs::<String, LuaValue>() {
      let (key, value) = pair?;
      match key.as_str() {
        "impl" => implementation = Some(implementation_from_lua(lua, value)?),
        "attrs" => attrs = attrs_from_lua(value)?,
        other => {
          return Err(LuaError::external(EvalError::Script(format!(
            "unexpected rule field '{}'",
            other
          ))));
        }
      }
    }

    let implementation = implementation
      .ok_or_else(|| LuaError::external(RuleError::InvalidImplementation("missing impl".to_string())))?;
    let definition = RuleDefinition::new(implementation, attrs).map_err(LuaError::external)?;
    Ok(LuaRule {
      definition: Arc::new(definition),
      registry: registry.clone(),
    })
  })
}

/// Wrap `value` as a rule implementation, requiring a function of exactly one parameter.
fn implementation_from_lua(lua: &Lua, value: LuaValue) -> LuaResult<Arc<dyn RuleImpl>> {
  let LuaValue::Function(func) = value else {
    return Err(LuaError::external(RuleError::InvalidImplementation(format!(
      "expected a function, got {}",
      value.type_name()
    ))));
  };

  let getinfo: LuaFunction = lua.named_registry_value(GETINFO_KEY)?;
  let info: LuaTable = getinfo.call((func.clone(), "u"))?;
  let nparams: i64 = info.get("nparams")?;
  let vararg: bool = info.get("isvararg")?;
  if nparams != 1 || vararg {
    return Err(LuaError::external(RuleError::InvalidImplementation(format!(
      "impl must take exactly one parameter (ctx), got {}{}",
      nparams,
      if vararg { " and varargs" } else { "" }
    ))));
  }

  Ok(Arc::new(LuaRuleImpl { lua: lua.weak(), func }))
}

fn attrs_from_lua(value: LuaValue) -> LuaResult<BTreeMap<String, AttrDescriptor>> {
  let LuaValue::Table(table) = value else {
    return Err(LuaError::external(EvalError::Script(format!(
      "rule attrs must be a table, got {}",
      value.type_name()
    ))));
  };

  let mut attrs = BTreeMap::new();
  for pair in table.pairs::<String, LuaValue>() {
    let (name, value) = pair?;
    let descriptor = match &value {
      LuaValue::UserData(ud) => ud.borrow::<LuaAttr>().ok().map(|attr| (*attr.0).clone()),
      _ => None,
    };
    let descriptor = descriptor.ok_or_else(|| {
      LuaError::external(EvalError::Script(format!(
        "attribute '{}' must be declared with attr.*, got {}",
        name,
        value.type_name()
      )))
    })?;
    attrs.insert(name, descriptor);
  }
  Ok(attrs)
}
