//! The action graph.
//!
//! An [`ActionNode`] is one unit of deferred work plus the state the scheduler records for it.
//! Nodes live in an [`ActionGraph`], a `petgraph` DAG whose edges run from a dependency to its
//! dependent, alongside the memo table mapping canonical labels to nodes.
//!
//! Node identity is the [`ActionId`]; two references to the same canonical label always share
//! one id.

pub mod actions;
pub mod context;
mod types;

pub use types::*;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::value::Value;

/// Stable handle to a node in an [`ActionGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(NodeIndex);

impl ActionId {
  pub fn index(&self) -> usize {
    self.0.index()
  }
}

/// Scheduling state of a node, derived from its recorded timestamps and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
  Pending,
  Ready,
  Running,
  Succeeded,
  Failed,
}

#[derive(Debug)]
pub struct ActionNode {
  key: String,
  label: String,
  deps: Vec<ActionId>,
  work: Arc<Work>,

  pub(crate) triggers: Vec<ActionId>,
  pub(crate) pending: usize,
  pub(crate) priority: usize,
  pub(crate) running: bool,
  pub(crate) value: Option<Value>,
  pub(crate) error: Option<ActionError>,
  pub(crate) failed: bool,
  pub(crate) time_ready: Option<Instant>,
  pub(crate) time_done: Option<Instant>,
}

impl ActionNode {
  /// `deps` is kept in order with duplicates removed.
  pub fn new(key: impl Into<String>, label: impl Into<String>, deps: Vec<ActionId>, work: Work) -> Self {
    let mut unique = Vec::with_capacity(deps.len());
    for dep in deps {
      if !unique.contains(&dep) {
        unique.push(dep);
      }
    }

    Self {
      key: key.into(),
      label: label.into(),
      deps: unique,
      work: Arc::new(work),
      triggers: Vec::new(),
      pending: 0,
      priority: 0,
      running: false,
      value: None,
      error: None,
      failed: false,
      time_ready: None,
      time_done: None,
    }
  }

  /// Root-relative path of the target.
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Canonical label, including any query.
  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn deps(&self) -> &[ActionId] {
    &self.deps
  }

  pub fn work(&self) -> &Work {
    &self.work
  }

  pub(crate) fn work_arc(&self) -> &Arc<Work> {
    &self.work
  }

  pub fn value(&self) -> Option<&Value> {
    self.value.as_ref()
  }

  pub fn error(&self) -> Option<&ActionError> {
    self.error.as_ref()
  }

  pub fn is_failed(&self) -> bool {
    self.failed
  }

  pub fn priority(&self) -> usize {
    self.priority
  }

  pub fn time_ready(&self) -> Option<Instant> {
    self.time_ready
  }

  pub fn time_done(&self) -> Option<Instant> {
    self.time_done
  }

  pub fn state(&self) -> ActionState {
    match (self.time_done, self.running, self.time_ready) {
      (Some(_), _, _) if self.failed => ActionState::Failed,
      (Some(_), _, _) => ActionState::Succeeded,
      (None, true, _) => ActionState::Running,
      (None, false, Some(_)) => ActionState::Ready,
      (None, false, None) => ActionState::Pending,
    }
  }

  /// Forget the results of an earlier execution.
  pub(crate) fn reset(&mut self) {
    self.triggers.clear();
    self.pending = 0;
    self.priority = 0;
    self.running = false;
    self.value = None;
    self.error = None;
    self.failed = false;
    self.time_ready = None;
    self.time_done = None;
  }
}

/// All nodes created for a build, plus the canonical-label memo table.
#[derive(Debug, Default)]
pub struct ActionGraph {
  graph: DiGraph<ActionNode, ()>,
  by_label: HashMap<String, ActionId>,
}

impl ActionGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Look up the node memoized for a canonical label.
  pub fn get(&self, label: &str) -> Option<ActionId> {
    self.by_label.get(label).copied()
  }

  /// Add a node, its dependency edges, and its memo entry.
  pub fn insert(&mut self, node: ActionNode) -> ActionId {
    let label = node.label.clone();
    let deps = node.deps.clone();
    let id = ActionId(self.graph.add_node(node));
    for dep in deps {
      self.graph.add_edge(dep.0, id.0, ());
    }
    self.by_label.insert(label, id);
    id
  }

  pub fn node(&self, id: ActionId) -> &ActionNode {
    &self.graph[id.0]
  }

  pub(crate) fn node_mut(&mut self, id: ActionId) -> &mut ActionNode {
    &mut self.graph[id.0]
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn edge_count(&self) -> usize {
    self.graph.edge_count()
  }

  pub fn ids(&self) -> impl Iterator<Item = ActionId> + '_ {
    self.graph.node_indices().map(ActionId)
  }

  /// Whether the graph is free of cycles. Construction never produces one; this is a check.
  pub fn is_acyclic(&self) -> bool {
    toposort(&self.graph, None).is_ok()
  }

  /// Nodes reachable from `root`, dependencies before dependents, visiting each node's
  /// dependencies in declaration order. The position of a node is its scheduling priority.
  pub fn post_order(&self, root: ActionId) -> Vec<ActionId> {
    let mut seen = HashSet::from([root]);
    let mut order = Vec::new();
    let mut stack = vec![(root, 0usize)];

    while let Some((id, next)) = stack.pop() {
      let deps = &self.node(id).deps;
      if let Some(&dep) = deps.get(next) {
        stack.push((id, next + 1));
        if seen.insert(dep) {
          stack.push((dep, 0));
        }
      } else {
        order.push(id);
      }
    }

    order
  }

  /// Explain why `root` failed: the first recorded error found depth-first through failed
  /// dependencies, or an unknown failure naming the deepest failed node.
  pub fn failure(&self, root: ActionId) -> Option<ActionError> {
    if !self.node(root).failed {
      return None;
    }
    let mut seen = HashSet::new();
    match self.find_failure(root, &mut seen) {
      Ok(err) => Some(err),
      Err(deepest) => Some(ActionError::UnknownFailure {
        key: self.node(deepest).key.clone(),
      }),
    }
  }

  fn find_failure(&self, id: ActionId, seen: &mut HashSet<ActionId>) -> Result<ActionError, ActionId> {
    seen.insert(id);
    let node = self.node(id);
    let mut deepest = id;

    for &dep in &node.deps {
      if seen.contains(&dep) || !self.node(dep).failed {
        continue;
      }
      match self.find_failure(dep, seen) {
        Ok(err) => return Ok(err),
        Err(failed) if deepest == id => deepest = failed,
        Err(_) => {}
      }
    }

    node.error.clone().ok_or(deepest)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  fn file_node(graph: &mut ActionGraph, key: &str, deps: Vec<ActionId>) -> ActionId {
    let node = ActionNode::new(
      key,
      format!("file://{}", key),
      deps,
      Work::File {
        path: PathBuf::from(key),
      },
    );
    graph.insert(node)
  }

  #[test]
  fn insert_memoizes_by_label() {
    let mut graph = ActionGraph::new();
    let a = file_node(&mut graph, "a", vec![]);
    assert_eq!(graph.get("file://a"), Some(a));
    assert_eq!(graph.get("file://b"), None);
    assert_eq!(graph.len(), 1);
  }

  #[test]
  fn duplicate_deps_collapse() {
    let mut graph = ActionGraph::new();
    let a = file_node(&mut graph, "a", vec![]);
    let b = file_node(&mut graph, "b", vec![a, a]);
    assert_eq!(graph.node(b).deps(), &[a]);
    assert_eq!(graph.edge_count(), 1);
  }

  #[test]
  fn post_order_puts_dependencies_first() {
    // root -> (left -> shared), (right -> shared)
    let mut graph = ActionGraph::new();
    let shared = file_node(&mut graph, "shared", vec![]);
    let left = file_node(&mut graph, "left", vec![shared]);
    let right = file_node(&mut graph, "right", vec![shared]);
    let root = file_node(&mut graph, "root", vec![left, right]);
    let unrelated = file_node(&mut graph, "unrelated", vec![]);

    let order = graph.post_order(root);
    assert_eq!(order, vec![shared, left, right, root]);
    assert!(!order.contains(&unrelated));
    assert!(graph.is_acyclic());
  }

  #[test]
  fn failure_prefers_recorded_error() {
    let mut graph = ActionGraph::new();
    let c = file_node(&mut graph, "c", vec![]);
    let b = file_node(&mut graph, "b", vec![c]);
    let a = file_node(&mut graph, "a", vec![b]);

    for id in [a, b, c] {
      graph.node_mut(id).failed = true;
    }
    graph.node_mut(c).error = Some(ActionError::Failed("compiler exploded".into()));

    assert_eq!(graph.failure(a), Some(ActionError::Failed("compiler exploded".into())));
  }

  #[test]
  fn failure_without_error_names_deepest_node() {
    let mut graph = ActionGraph::new();
    let c = file_node(&mut graph, "c", vec![]);
    let b = file_node(&mut graph, "b", vec![c]);
    let a = file_node(&mut graph, "a", vec![b]);

    for id in [a, b, c] {
      graph.node_mut(id).failed = true;
    }

    assert_eq!(graph.failure(a), Some(ActionError::UnknownFailure { key: "c".into() }));
  }

  #[test]
  fn healthy_root_has_no_failure() {
    let mut graph = ActionGraph::new();
    let a = file_node(&mut graph, "a", vec![]);
    assert_eq!(graph.failure(a), None);
    assert_eq!(graph.node(a).state(), ActionState::Pending);
  }
}
