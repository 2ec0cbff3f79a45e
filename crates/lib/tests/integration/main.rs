//! End-to-end tests driving real `BUILD.lua` trees through the builder.

mod build_tests;
mod common;
mod lua_tests;
