//! Test helpers for building action graphs by hand.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::action::context::BuildContext;
use crate::action::{ActionAttr, ActionError, ActionGraph, ActionId, ActionNode, RuleWork, Work};
use crate::attr::AttrValue;
use crate::consts::NAME_ATTR;
use crate::rule::{RuleDefinition, RuleImpl};
use crate::value::Value;

/// Insert a rule-backed node named `name` at the build root.
pub fn rule_node(graph: &mut ActionGraph, name: &str, deps: Vec<ActionId>, implementation: Arc<dyn RuleImpl>) -> ActionId {
  let rule = Arc::new(RuleDefinition::new(implementation, BTreeMap::new()).unwrap());
  let name_value = AttrValue::String(name.to_string());
  let instance = rule
    .instantiate("BUILD.lua", BTreeMap::from([(NAME_ATTR.to_string(), name_value.clone())]))
    .unwrap();
  let attrs = BTreeMap::from([(NAME_ATTR.to_string(), ActionAttr::Value(name_value))]);

  let node = ActionNode::new(
    name,
    format!("file://{}", name),
    deps,
    Work::Rule(RuleWork::new(Arc::new(instance), attrs)),
  );
  graph.insert(node)
}

/// Counts invocations and returns the running count.
pub fn counting_rule(counter: Arc<AtomicUsize>) -> Arc<dyn RuleImpl> {
  Arc::new(move |_: &BuildContext| -> Result<Value, ActionError> {
    let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
    Ok(Value::Int(count as i64))
  })
}

pub fn failing_rule(message: &str) -> Arc<dyn RuleImpl> {
  let message = message.to_string();
  Arc::new(move |_: &BuildContext| -> Result<Value, ActionError> { Err(ActionError::Failed(message.clone())) })
}

/// Appends `name` to `log` when invoked.
pub fn recording_rule(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn RuleImpl> {
  let name = name.to_string();
  Arc::new(move |_: &BuildContext| -> Result<Value, ActionError> {
    log.lock().unwrap().push(name.clone());
    Ok(Value::String(name.clone()))
  })
}

/// Waits until `parties` invocations are in flight at once, failing after `timeout`.
pub fn rendezvous_rule(arrived: Arc<AtomicUsize>, parties: usize, timeout: Duration) -> Arc<dyn RuleImpl> {
  Arc::new(move |_: &BuildContext| -> Result<Value, ActionError> {
    arrived.fetch_add(1, Ordering::SeqCst);
    let deadline = Instant::now() + timeout;
    while arrived.load(Ordering::SeqCst) < parties {
      if Instant::now() >= deadline {
        return Err(ActionError::Failed("peers never arrived".to_string()));
      }
      std::thread::sleep(Duration::from_millis(5));
    }
    Ok(Value::Bool(true))
  })
}

/// Records the highest number of simultaneous invocations in `peak`.
pub fn peak_tracking_rule(running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>, hold: Duration) -> Arc<dyn RuleImpl> {
  Arc::new(move |_: &BuildContext| -> Result<Value, ActionError> {
    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
    peak.fetch_max(now, Ordering::SeqCst);
    std::thread::sleep(hold);
    running.fetch_sub(1, Ordering::SeqCst);
    Ok(Value::Nil)
  })
}
