//! laze-lib: the build graph engine behind `laze`.
//!
//! - [`label`]: label resolution and canonical forms
//! - [`attr`]: typed rule attributes
//! - [`rule`]: rule definitions, instances, and the instance registry
//! - [`build`]: lazy, memoized construction of the action graph
//! - [`execute`]: the worker-pool scheduler
//! - [`action`]: graph nodes, the build context, and side-effecting capabilities
//! - [`lua`]: the `BUILD.lua` language

pub mod action;
pub mod attr;
pub mod build;
pub mod consts;
pub mod eval;
pub mod execute;
pub mod label;
pub mod lua;
pub mod platform;
pub mod rule;
#[cfg(test)]
mod util;
pub mod value;
