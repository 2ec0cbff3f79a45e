//! Graph execution.
//!
//! One coordinator and a fixed pool of worker tasks. The coordinator owns the graph: it
//! computes priorities and trigger sets, keeps the ready queue, and is the only writer of node
//! state. Workers receive self-contained jobs over a bounded channel, run the node's work on
//! the blocking pool, and report back over a second bounded channel.
//!
//! A node whose dependency failed still passes through a worker, which skips its work and
//! reports it as done. Failure therefore reaches every dependent through the same
//! pending-count bookkeeping as success, and unrelated branches keep running.

mod queue;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::action::context::ExecEnv;
use crate::action::{ActionError, ActionGraph, ActionId, Work};
use crate::value::Value;

use queue::ReadyQueue;

pub use types::{ExecuteConfig, ExecuteError, ExecuteStats};

/// Everything a worker needs to run one node, detached from the graph.
struct Job {
  id: ActionId,
  key: String,
  label: String,
  work: Arc<Work>,
  inputs: HashMap<ActionId, Value>,
  skip: bool,
}

struct Completion {
  id: ActionId,
  /// `None` when the work was skipped.
  outcome: Option<Result<Value, ActionError>>,
  finished: Instant,
}

/// Execute every node reachable from `root`.
///
/// Results are recorded on the nodes; read the root's value, or its failure through
/// [`ActionGraph::failure`]. State from an earlier execution of the same nodes is discarded
/// first.
pub async fn execute(
  graph: &mut ActionGraph,
  root: ActionId,
  env: &ExecEnv,
  config: &ExecuteConfig,
) -> Result<ExecuteStats, ExecuteError> {
  let started = Instant::now();
  let order = graph.post_order(root);
  let parallelism = config.parallelism.max(1);
  info!(actions = order.len(), parallelism, "starting execution");

  let mut ready = ReadyQueue::default();
  prepare(graph, &order, &mut ready);

  let (job_tx, job_rx) = mpsc::channel::<Job>(parallelism);
  let (done_tx, mut done_rx) = mpsc::channel::<Completion>(parallelism);
  let job_rx = Arc::new(Mutex::new(job_rx));

  let mut workers = JoinSet::new();
  for worker in 0..parallelism {
    workers.spawn(run_worker(worker, Arc::clone(&job_rx), done_tx.clone(), env.clone()));
  }
  drop(done_tx);

  let mut stats = ExecuteStats {
    total: order.len(),
    ..Default::default()
  };
  let mut idle = parallelism;

  for remaining in (1..=order.len()).rev() {
    while idle > 0
      && let Some(id) = ready.pop()
    {
      let job = dispatch(graph, id, config);
      job_tx
        .send(job)
        .await
        .map_err(|_| ExecuteError::WorkersStopped { remaining })?;
      idle -= 1;
    }

    let completion = done_rx
      .recv()
      .await
      .ok_or(ExecuteError::WorkersStopped { remaining })?;
    idle += 1;
    complete(graph, completion, &mut ready, &mut stats);
  }

  drop(job_tx);
  while let Some(result) = workers.join_next().await {
    if let Err(e) = result {
      error!(error = %e, "worker task failed");
    }
  }

  stats.elapsed = started.elapsed();
  info!(
    executed = stats.executed,
    skipped = stats.skipped,
    failed = stats.failed,
    elapsed_ms = stats.elapsed.as_millis() as u64,
    "execution finished"
  );
  Ok(stats)
}

/// Reset node state, assign post-order priorities, compute triggers and pending counts, and
/// seed the ready queue.
fn prepare(graph: &mut ActionGraph, order: &[ActionId], ready: &mut ReadyQueue) {
  for (priority, &id) in order.iter().enumerate() {
    let node = graph.node_mut(id);
    node.reset();
    node.priority = priority;
  }

  let now = Instant::now();
  for &id in order {
    let deps = graph.node(id).deps().to_vec();
    for &dep in &deps {
      graph.node_mut(dep).triggers.push(id);
    }

    let node = graph.node_mut(id);
    node.pending = deps.len();
    if node.pending == 0 {
      node.time_ready = Some(now);
      ready.push(node.priority, id);
    }
  }
}

/// Mark `id` running and package it for a worker. Once the build is cancelled, nodes are
/// failed here instead of running.
fn dispatch(graph: &mut ActionGraph, id: ActionId, config: &ExecuteConfig) -> Job {
  let node = graph.node_mut(id);
  node.running = true;
  if !node.failed && config.cancel.is_cancelled() {
    node.failed = true;
    node.error = Some(ActionError::Cancelled);
  }

  let node = graph.node(id);
  let inputs = if node.is_failed() {
    HashMap::new()
  } else {
    node
      .deps()
      .iter()
      .map(|&dep| (dep, graph.node(dep).value().cloned().unwrap_or_default()))
      .collect()
  };

  Job {
    id,
    key: node.key().to_string(),
    label: node.label().to_string(),
    work: Arc::clone(node.work_arc()),
    inputs,
    skip: node.is_failed(),
  }
}

/// Record a finished node and release its dependents.
fn complete(graph: &mut ActionGraph, completion: Completion, ready: &mut ReadyQueue, stats: &mut ExecuteStats) {
  let Completion { id, outcome, finished } = completion;

  let node = graph.node_mut(id);
  node.running = false;
  node.time_done = Some(finished);
  match outcome {
    None => stats.skipped += 1,
    Some(Ok(value)) => {
      stats.executed += 1;
      node.value = Some(value);
    }
    Some(Err(err)) => {
      stats.executed += 1;
      stats.failed += 1;
      error!(action = %node.label(), error = %err, "action failed");
      node.failed = true;
      node.error = Some(err);
    }
  }

  let failed = node.failed;
  let triggers = node.triggers.clone();
  for trigger in triggers {
    let dependent = graph.node_mut(trigger);
    if failed {
      dependent.failed = true;
    }
    dependent.pending -= 1;
    if dependent.pending == 0 {
      dependent.time_ready = Some(Instant::now());
      ready.push(dependent.priority, trigger);
    }
  }
}

async fn run_worker(
  worker: usize,
  jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
  done: mpsc::Sender<Completion>,
  env: ExecEnv,
) {
  loop {
    let job = jobs.lock().await.recv().await;
    let Some(job) = job else {
      break;
    };

    let id = job.id;
    let outcome = if job.skip {
      warn!(action = %job.label, "skipping action");
      None
    } else {
      Some(run_job(job, &env).await)
    };

    let completion = Completion {
      id,
      outcome,
      finished: Instant::now(),
    };
    if done.send(completion).await.is_err() {
      break;
    }
  }
  debug!(worker, "worker stopped");
}

async fn run_job(job: Job, env: &ExecEnv) -> Result<Value, ActionError> {
  let Job {
    key, label, work, inputs, ..
  } = job;
  debug!(action = %label, "running action");

  let env = env.clone();
  let task_key = key.clone();
  let task_label = label.clone();
  let result = tokio::task::spawn_blocking(move || work.run(&task_key, &task_label, &inputs, &env)).await;

  match result {
    Ok(outcome) => {
      debug!(action = %label, ok = outcome.is_ok(), "action finished");
      outcome
    }
    Err(e) => {
      error!(action = %label, error = %e, "action panicked");
      Err(ActionError::Panicked { key })
    }
  }
}
