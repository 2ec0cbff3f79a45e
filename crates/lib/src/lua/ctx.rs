//! The `ctx` table passed to Lua rule implementations.
//!
//! `ctx.actions` offers `run`, `stat`, `write`, `declare` and `tar`. Container images are not
//! assembled here: `ctx.actions:container` exists only to fail with a pointer to `tar` and an
//! external image tool.

use mlua::prelude::*;

use super::convert::value_to_lua;
use crate::action::ActionError;
use crate::action::actions::{Actions, RunOpts, TarOpts, WriteOpts};
use crate::action::context::BuildContext;
use crate::value::Value;

const DEFAULT_WRITE_MODE: u32 = 0o644;
const DEFAULT_TAR_MODE: u32 = 0o644;

const CONTAINER_UNSUPPORTED: &str = concat!(
  "container images are not built by laze; ",
  "package layers with ctx.actions:tar and assemble the image with an external tool"
);

/// `ctx.actions`: the side-effecting capabilities, as methods (`ctx.actions:run{...}`).
pub struct LuaActions(pub Actions);

impl LuaUserData for LuaActions {
  fn add_methods<M: LuaUserDataMethods<Self>>(methods: &mut M) {
    // `run` and `tar` are async so the Lua state is free for other rules while they wait.
    methods.add_async_method("run", |_, this, opts: LuaTable| {
      let actions = this.0.clone();
      let opts = run_opts(&opts);
      async move {
        let opts = opts?;
        actions.run_async(&opts).await.map_err(LuaError::external)
      }
    });

    methods.add_method("stat", |lua, this, name: String| {
      let info = this.0.stat(&name).map_err(LuaError::external)?;
      value_to_lua(lua, &Value::File(info))
    });

    methods.add_method("write", |lua, this, opts: LuaTable| {
      let content: LuaString = opts.get("content")?;
      let opts = WriteOpts {
        name: opts.get("name")?,
        content: content.as_bytes().to_vec(),
        mode: opts.get::<Option<u32>>("mode")?.unwrap_or(DEFAULT_WRITE_MODE),
      };
      let info = this.0.write(&opts).map_err(LuaError::external)?;
      value_to_lua(lua, &Value::File(info))
    });

    methods.add_method("declare", |_, this, parts: LuaVariadic<String>| {
      this.0.declare(&parts[..]).map_err(LuaError::external)
    });

    methods.add_method("container", |_, _, _: LuaMultiValue| -> LuaResult<()> {
      Err(LuaError::external(ActionError::Unsupported(CONTAINER_UNSUPPORTED.to_string())))
    });

    methods.add_async_method("tar", |lua, this, opts: LuaTable| {
      let actions = this.0.clone();
      let opts = tar_opts(&opts);
      async move {
        let info = actions.tar_async(opts?).await.map_err(LuaError::external)?;
        value_to_lua(&lua, &Value::File(info))
      }
    });
  }
}

fn run_opts(opts: &LuaTable) -> LuaResult<RunOpts> {
  Ok(RunOpts {
    name: opts.get("name")?,
    args: opts.get::<Option<Vec<String>>>("args")?.unwrap_or_default(),
    env: opts.get::<Option<Vec<String>>>("env")?.unwrap_or_default(),
  })
}

fn tar_opts(opts: &LuaTable) -> LuaResult<TarOpts> {
  Ok(TarOpts {
    name: opts.get("name")?,
    files: opts.get::<Option<Vec<String>>>("files")?.unwrap_or_default(),
    mode: opts.get::<Option<u32>>("mode")?.unwrap_or(DEFAULT_TAR_MODE),
    strip_prefix: opts.get("strip_prefix")?,
    package_dir: opts.get("package_dir")?,
  })
}

/// Build the `ctx` table for one rule invocation.
pub fn context_to_lua(lua: &Lua, ctx: &BuildContext) -> LuaResult<LuaTable> {
  let table = lua.create_table()?;
  table.set("key", ctx.key())?;
  table.set("label", ctx.label())?;
  table.set("name", ctx.name())?;
  table.set("os", ctx.os())?;
  table.set("arch", ctx.arch())?;
  table.set("build_dir", ctx.build_dir())?;
  table.set("build_file_path", ctx.build_file_path())?;
  table.set("args", lua.create_sequence_from(ctx.args().iter().cloned())?)?;

  let attrs = lua.create_table()?;
  for (name, value) in ctx.attrs() {
    attrs.set(name.as_str(), value_to_lua(lua, value)?)?;
  }
  table.set("attrs", attrs)?;
  table.set("actions", LuaActions(ctx.actions().clone()))?;

  Ok(table)
}
