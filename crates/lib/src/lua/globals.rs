//! Globals visible to every build file and module.
//!
//! - `rule{ impl = fn, attrs = { ... } }` - define a rule
//! - `attr.*` - attribute constructors
//! - `laze.os`, `laze.arch`, `laze.platform` - the host
//! - `laze.root` - absolute path of the build root

use std::path::Path;

use mlua::prelude::*;

use super::attr::create_attr_table;
use super::rule::create_rule_function;
use crate::platform::Platform;
use crate::rule::SharedRegistry;

/// Register `rule`, `attr` and `laze` in the Lua globals.
pub fn register_globals(lua: &Lua, root: &Path, registry: SharedRegistry) -> LuaResult<()> {
  let globals = lua.globals();
  globals.set("rule", create_rule_function(lua, registry)?)?;
  globals.set("attr", create_attr_table(lua)?)?;

  let platform = Platform::current();
  let laze = lua.create_table()?;
  laze.set("os", platform.os.as_str())?;
  laze.set("arch", platform.arch.as_str())?;
  laze.set("platform", platform.triple())?;
  laze.set("root", root.to_string_lossy().into_owned())?;
  globals.set("laze", laze)?;

  Ok(())
}
