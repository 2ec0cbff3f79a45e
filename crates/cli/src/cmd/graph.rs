//! Implementation of the `laze graph` command.
//!
//! Evaluates build files and constructs the action graph of a label without executing any
//! action, then prints every reachable node with its direct dependencies.

use std::path::Path;

use anyhow::{Context, Result};

use laze_lib::action::Work;
use laze_lib::build::{BuildConfig, Builder};

use crate::output::{print_info, symbols};

pub fn cmd_graph(label: &str, root: &Path) -> Result<()> {
  let mut builder = Builder::new(BuildConfig::new(root)).context("Failed to start Lua runtime")?;
  let id = builder
    .create_action(label)
    .with_context(|| format!("Failed to construct graph for {}", label))?;

  let graph = builder.graph();
  let order = graph.post_order(id);
  print_info(&format!("{} actions", order.len()));

  for id in order {
    let node = graph.node(id);
    let kind = match node.work() {
      Work::File { .. } => "file",
      Work::Rule(_) => "rule",
    };
    println!("{} ({})", node.label(), kind);
    for dep in node.deps() {
      println!("  {} {}", symbols::ARROW, graph.node(*dep).label());
    }
  }

  Ok(())
}
