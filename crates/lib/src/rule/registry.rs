use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{RuleError, RuleInstance};

/// Registered rule instances, keyed by their root-relative label path.
#[derive(Debug, Default)]
pub struct RuleRegistry {
  instances: HashMap<String, Arc<RuleInstance>>,
}

impl RuleRegistry {
  pub fn register(&mut self, instance: RuleInstance) -> Result<Arc<RuleInstance>, RuleError> {
    if self.instances.contains_key(instance.key()) {
      return Err(RuleError::Duplicate(instance.key().to_string()));
    }
    debug!(key = instance.key(), "registered rule instance");
    let instance = Arc::new(instance);
    self.instances.insert(instance.key().to_string(), Arc::clone(&instance));
    Ok(instance)
  }

  pub fn get(&self, key: &str) -> Option<Arc<RuleInstance>> {
    self.instances.get(key).cloned()
  }

  pub fn len(&self) -> usize {
    self.instances.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instances.is_empty()
  }

  /// Registered keys, sorted.
  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.instances.keys().cloned().collect();
    keys.sort();
    keys
  }
}

/// Registry handle shared between the builder and the build-file evaluator.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry(Arc<Mutex<RuleRegistry>>);

impl SharedRegistry {
  pub fn lock(&self) -> MutexGuard<'_, RuleRegistry> {
    self.0.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
