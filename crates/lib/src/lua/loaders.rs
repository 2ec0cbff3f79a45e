//! Build-file and module loading with per-file environments.
//!
//! Every build file and every module loaded through `require` runs in a fresh environment
//! table. Reads fall through to `_G`; assignments stay in the file's own table, so top-level
//! names of one build file never leak into another. `__dir` holds the absolute directory of
//! the file being run.
//!
//! `require` keeps Lua's own resolution and caching: only `package.searchers[2]` is replaced,
//! so modules are still looked up through `package.path` and stored in `package.loaded`.

use std::fs;
use std::path::Path;

use mlua::prelude::*;

use crate::eval::BuildFile;

/// Registry key holding the root-relative path of the build file being evaluated. Rule
/// instantiation reads it to decide where an instance is registered.
pub(crate) const CURRENT_BUILD_FILE_KEY: &str = "__laze_build_file";

/// Name of the per-file directory variable.
const DIR_VAR: &str = "__dir";

/// Create an environment table for a file in `dir`, inheriting reads from `_G`.
fn file_env(lua: &Lua, dir: &Path) -> LuaResult<LuaTable> {
  let env = lua.create_table()?;
  env.set(DIR_VAR, dir.to_string_lossy().into_owned())?;

  let mt = lua.create_table()?;
  mt.set("__index", lua.globals())?;
  env.set_metatable(Some(mt))?;
  Ok(env)
}

fn read_source(path: &Path) -> LuaResult<(std::path::PathBuf, String)> {
  let canonical = path
    .canonicalize()
    .map_err(|e| LuaError::external(format!("cannot resolve '{}': {}", path.display(), e)))?;
  let content = fs::read_to_string(&canonical)
    .map_err(|e| LuaError::external(format!("cannot read '{}': {}", canonical.display(), e)))?;
  Ok((canonical, content))
}

/// Run a module file and return its result.
pub fn load_module(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let (canonical, content) = read_source(path)?;
  let env = file_env(lua, canonical.parent().unwrap_or(Path::new(".")))?;

  lua
    .load(&content)
    .set_name(format!("@{}", canonical.display()))
    .set_environment(env)
    .eval::<LuaValue>()
}

/// Evaluate a build file, returning the names it bound at top level, sorted.
///
/// While the file runs, rule calls register their instances under the file's directory.
pub fn load_build_file(lua: &Lua, file: &BuildFile) -> LuaResult<Vec<String>> {
  let (canonical, content) = read_source(&file.fs_path)?;
  let env = file_env(lua, canonical.parent().unwrap_or(Path::new(".")))?;

  let previous: Option<String> = lua.named_registry_value(CURRENT_BUILD_FILE_KEY)?;
  lua.set_named_registry_value(CURRENT_BUILD_FILE_KEY, file.path.as_str())?;

  let result = lua
    .load(&content)
    .set_name(format!("@{}", file.path))
    .set_environment(env.clone())
    .exec();

  // Restore even on failure; the evaluation error wins over a failed restore.
  let restored = lua.set_named_registry_value(CURRENT_BUILD_FILE_KEY, previous);
  result?;
  restored?;

  let mut names = Vec::new();
  for pair in env.pairs::<LuaValue, LuaValue>() {
    let (key, _) = pair?;
    if let LuaValue::String(key) = key {
      let key = key.to_str()?.to_string();
      if key != DIR_VAR {
        names.push(key);
      }
    }
  }
  names.sort();
  Ok(names)
}

/// A replacement for `package.searchers[2]` that loads modules through [`load_module`].
fn create_lua_searcher(lua: &Lua) -> LuaResult<LuaFunction> {
  lua.create_function(|lua, modname: String| {
    let package: LuaTable = lua.globals().get("package")?;
    let search_path: String = package.get("path")?;
    let searchpath: LuaFunction = package.get("searchpath")?;
    let (found, tried): (Option<String>, Option<String>) = searchpath.call((modname.as_str(), search_path))?;

    match found {
      Some(file) => {
        let module_path = file.clone();
        let loader = lua.create_function(move |lua, _: LuaMultiValue| load_module(lua, Path::new(&module_path)))?;
        Ok((LuaValue::Function(loader), LuaValue::String(lua.create_string(&file)?)))
      }
      None => {
        let reason = tried.unwrap_or_else(|| format!("no file for module '{}'", modname));
        Ok((LuaValue::Nil, LuaValue::String(lua.create_string(format!("\n\t{}", reason.trim_start()))?)))
      }
    }
  })
}

/// Install the module searcher.
pub fn install_loaders(lua: &Lua) -> LuaResult<()> {
  let package: LuaTable = lua.globals().get("package")?;
  let searchers: LuaTable = package.get("searchers")?;
  searchers.set(2, create_lua_searcher(lua)?)?;
  Ok(())
}
