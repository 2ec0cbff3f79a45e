mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, cmd_build, cmd_graph};

/// laze - a Lua-scripted build engine
#[derive(Parser)]
#[command(name = "laze")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build a label and print its value
  Build {
    /// Label to build, e.g. cmd/server/bin or file://src/main.go
    label: String,

    /// Directory labels are resolved against
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Maximum number of actions run at once [default: $LAZE_JOBS or the CPU count]
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Cancel the build after this long, e.g. 30s or 5m
    #[arg(long)]
    timeout: Option<humantime::Duration>,

    /// Arguments passed to rules as ctx.args
    #[arg(last = true)]
    args: Vec<String>,
  },

  /// Print the action graph of a label without running it
  Graph {
    /// Label whose graph to print
    label: String,

    /// Directory labels are resolved against
    #[arg(long, default_value = ".")]
    root: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      label,
      root,
      jobs,
      json,
      timeout,
      args,
    } => cmd_build(BuildArgs {
      label,
      root,
      jobs,
      json,
      timeout: timeout.map(Into::into),
      args,
    }),
    Commands::Graph { label, root } => cmd_graph(&label, &root),
  }
}
