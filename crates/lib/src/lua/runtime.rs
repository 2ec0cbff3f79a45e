use std::path::Path;

use mlua::prelude::*;
use tracing::debug;

use super::convert::eval_error;
use super::{globals, loaders, rule};
use crate::eval::{BuildFile, BuildFileEvaluator, EvalError};
use crate::rule::SharedRegistry;

/// Create a Lua runtime for the build rooted at `root`.
///
/// Modules resolve against the root (`require("rules.go")` finds `<root>/rules/go.lua` or
/// `<root>/rules/go/init.lua`). Rule instances register into `registry`.
pub fn create_runtime(root: &Path, registry: SharedRegistry) -> LuaResult<Lua> {
  let root = std::path::absolute(root).map_err(|e| LuaError::external(format!("cannot resolve '{}': {}", root.display(), e)))?;

  // SAFETY: the debug library is only used to inspect rule implementations; it is removed
  // from the globals before any user code runs.
  let lua = unsafe { Lua::unsafe_new_with(LuaStdLib::ALL_SAFE | LuaStdLib::DEBUG, LuaOptions::default()) };
  rule::capture_getinfo(&lua)?;

  let package: LuaTable = lua.globals().get("package")?;
  package.set("path", format!("{0}/?.lua;{0}/?/init.lua", root.display()))?;
  loaders::install_loaders(&lua)?;

  globals::register_globals(&lua, &root, registry)?;
  Ok(lua)
}

/// Evaluates `BUILD.lua` files in one long-lived Lua runtime, so modules are loaded once per
/// build.
pub struct LuaEvaluator {
  lua: Lua,
}

impl LuaEvaluator {
  pub fn new(root: &Path, registry: SharedRegistry) -> Result<Self, EvalError> {
    let lua = create_runtime(root, registry).map_err(|e| EvalError::Runtime(e.to_string()))?;
    Ok(Self { lua })
  }

  pub fn lua(&self) -> &Lua {
    &self.lua
  }
}

impl BuildFileEvaluator for LuaEvaluator {
  fn evaluate(&mut self, file: &BuildFile) -> Result<Vec<String>, EvalError> {
    debug!(file = %file.path, "loading build file");
    loaders::load_build_file(&self.lua, file).map_err(|e| eval_error(&e))
  }
}
