//! Implementation of the `laze build` command.
//!
//! Constructs the action graph of one label, executes it and prints the root's value. Exits
//! non-zero when construction fails or the root action (or anything it depends on) fails.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use laze_lib::build::{BuildConfig, BuildOutcome, Builder};
use laze_lib::execute::{ExecuteConfig, ExecuteStats};
use laze_lib::value::Value;

use crate::output::{format_duration, format_value, print_error, print_json, print_stat, print_success, print_warning};

pub struct BuildArgs {
  pub label: String,
  pub root: PathBuf,
  pub jobs: Option<usize>,
  pub json: bool,
  pub timeout: Option<Duration>,
  pub args: Vec<String>,
}

#[derive(Serialize)]
struct BuildOutput<'a> {
  label: &'a str,
  success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  value: Option<&'a Value>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
  stats: StatsOutput,
}

#[derive(Serialize)]
struct StatsOutput {
  total: usize,
  executed: usize,
  failed: usize,
  skipped: usize,
  elapsed_ms: u128,
}

impl From<&ExecuteStats> for StatsOutput {
  fn from(stats: &ExecuteStats) -> Self {
    Self {
      total: stats.total,
      executed: stats.executed,
      failed: stats.failed,
      skipped: stats.skipped,
      elapsed_ms: stats.elapsed.as_millis(),
    }
  }
}

pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let BuildArgs {
    label,
    root,
    jobs,
    json,
    timeout,
    args,
  } = args;

  let mut execute = ExecuteConfig::from_env();
  if let Some(jobs) = jobs {
    if jobs == 0 {
      bail!("--jobs must be at least 1");
    }
    execute.parallelism = jobs;
  }

  let config = BuildConfig { root, execute, args };
  let cancel = config.execute.cancel.clone();

  let mut builder = Builder::new(config).context("Failed to start Lua runtime")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(async {
    if let Some(timeout) = timeout {
      let cancel = cancel.clone();
      tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        warn!(timeout = %humantime::format_duration(timeout), "build timed out, cancelling");
        cancel.cancel();
      });
    }
    builder.build(&label).await
  });
  let outcome = outcome.with_context(|| format!("Failed to build {}", label))?;

  info!(label = %outcome.label, executed = outcome.stats.executed, "build finished");

  if json {
    print_json(&BuildOutput {
      label: &outcome.label,
      success: outcome.is_success(),
      value: outcome.value(),
      error: outcome.error().map(|e| e.to_string()),
      stats: StatsOutput::from(&outcome.stats),
    })?;
  } else {
    print_outcome(&outcome);
  }

  if !outcome.is_success() {
    if cancel.is_cancelled() && !json {
      print_warning("build was cancelled before it finished");
    }
    std::process::exit(1);
  }
  Ok(())
}

fn print_outcome(outcome: &BuildOutcome) {
  match &outcome.result {
    Ok(value) => {
      print_success(&format!("Built {}", outcome.label));
      println!("{}", format_value(value));
    }
    Err(err) => print_error(&format!("Failed to build {}: {}", outcome.label, err)),
  }

  let stats = &outcome.stats;
  print_stat("Actions", &stats.total.to_string());
  print_stat("Executed", &stats.executed.to_string());
  if stats.failed > 0 {
    print_stat("Failed", &stats.failed.to_string());
  }
  if stats.skipped > 0 {
    print_stat("Skipped", &stats.skipped.to_string());
  }
  print_stat("Elapsed", &format_duration(stats.elapsed));
}
