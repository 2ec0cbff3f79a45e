//! Configuration, statistics and errors of graph execution.

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::consts::JOBS_ENV;

/// Errors of the scheduler itself. Failures of individual actions are recorded on their nodes.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("worker pool stopped with {remaining} actions outstanding")]
  WorkersStopped { remaining: usize },
}

/// Configuration for graph execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Number of worker tasks; at most this many actions run at once.
  pub parallelism: usize,

  /// Stops dispatch of new work when cancelled; running subprocesses are killed.
  pub cancel: CancellationToken,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      cancel: CancellationToken::new(),
    }
  }
}

impl ExecuteConfig {
  /// Defaults, with parallelism taken from `LAZE_JOBS` when it holds a positive integer.
  pub fn from_env() -> Self {
    let mut config = Self::default();
    if let Ok(value) = std::env::var(JOBS_ENV) {
      match value.trim().parse::<usize>() {
        Ok(jobs) if jobs > 0 => config.parallelism = jobs,
        _ => warn!(var = JOBS_ENV, value = %value, "ignoring invalid job count"),
      }
    }
    config
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Counts from one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteStats {
  /// Nodes reachable from the root.
  pub total: usize,
  /// Nodes whose work ran, successfully or not.
  pub executed: usize,
  /// Nodes passed over because a dependency failed or the build was cancelled.
  pub skipped: usize,
  /// Nodes whose own work failed.
  pub failed: usize,
  pub elapsed: Duration,
}
