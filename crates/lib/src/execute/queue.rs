use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::action::ActionId;

/// Ready nodes, lowest priority number first.
#[derive(Debug, Default)]
pub(crate) struct ReadyQueue {
  heap: BinaryHeap<Reverse<(usize, ActionId)>>,
}

impl ReadyQueue {
  pub fn push(&mut self, priority: usize, id: ActionId) {
    self.heap.push(Reverse((priority, id)));
  }

  pub fn pop(&mut self) -> Option<ActionId> {
    self.heap.pop().map(|Reverse((_, id))| id)
  }

  pub fn len(&self) -> usize {
    self.heap.len()
  }
}
