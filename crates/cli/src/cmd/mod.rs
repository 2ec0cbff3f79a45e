mod build;
mod graph;

pub use build::{BuildArgs, cmd_build};
pub use graph::cmd_graph;
