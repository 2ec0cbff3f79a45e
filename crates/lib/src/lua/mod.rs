//! The Lua build-file language.
//!
//! Build files are evaluated in a single runtime per build. They define rules with `rule{}`,
//! declare attributes with `attr.*`, and instantiate rules by calling them with keyword
//! tables. Rule implementations run later, on worker threads, with a `ctx` table describing
//! the invocation.
//!
//! # Submodules
//!
//! - [`attr`] - the `attr` constructors and attribute conversions
//! - [`ctx`] - the `ctx` table and `ctx.actions`
//! - [`globals`] - registration of `rule`, `attr` and `laze`
//! - [`loaders`] - per-file environments and `require`
//! - [`rule`] - `rule{}` and callable rule definitions
//! - [`runtime`] - runtime creation and [`LuaEvaluator`]

pub mod attr;
mod convert;
pub mod ctx;
pub mod globals;
pub mod loaders;
pub mod rule;
pub mod runtime;

pub use runtime::LuaEvaluator;
