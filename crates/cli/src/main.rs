mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{ProvisionArgs, cmd_info, cmd_invocation, cmd_link_order, cmd_order, cmd_provision};
use output::{OutputFormat, print_error};

/// judgebox - provision a self-contained C++ toolchain for a judge container
#[derive(Parser)]
#[command(name = "judgebox")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short = 'o', long = "format", global = true, value_enum, default_value = "text")]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the order packages would be built in
  Order {
    /// Path to the manifest (.lua or .json)
    manifest: PathBuf,
  },

  /// Print the static-link block
  LinkOrder {
    /// Path to the manifest (.lua or .json)
    manifest: PathBuf,
  },

  /// Print the compile command or wrapper script
  Invocation {
    /// Path to the manifest (.lua or .json)
    manifest: PathBuf,

    /// Print the wrapper script instead of a resolved command line
    #[arg(long)]
    script: bool,

    /// Prefix to resolve the command against
    #[arg(long)]
    prefix: Option<PathBuf>,
  },

  /// Build every package into a fresh prefix
  Provision {
    /// Path to the manifest (.lua or .json)
    manifest: PathBuf,

    /// Install prefix (overrides the manifest and JUDGEBOX_PREFIX)
    #[arg(long)]
    prefix: Option<PathBuf>,

    /// Download and compiler cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Parallel build jobs
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Show the resolved steps without building anything
    #[arg(long)]
    dry_run: bool,

    /// Keep the prefix when the run fails
    #[arg(long)]
    keep_failed: bool,

    /// Remove an existing prefix first
    #[arg(long)]
    clean: bool,

    /// Abort any single build step running longer than this (e.g. "30m")
    #[arg(long, value_parser = humantime::parse_duration)]
    step_timeout: Option<Duration>,
  },

  /// Show what a provisioned prefix contains
  Info {
    /// Install prefix (defaults to JUDGEBOX_PREFIX)
    #[arg(long)]
    prefix: Option<PathBuf>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "info" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let output = cli.output;
  let result = match cli.command {
    Commands::Order { manifest } => cmd_order(&manifest, output),
    Commands::LinkOrder { manifest } => cmd_link_order(&manifest, output),
    Commands::Invocation {
      manifest,
      script,
      prefix,
    } => cmd_invocation(&manifest, prefix, script, output),
    Commands::Provision {
      manifest,
      prefix,
      cache_dir,
      jobs,
      dry_run,
      keep_failed,
      clean,
      step_timeout,
    } => cmd_provision(
      &manifest,
      ProvisionArgs {
        prefix,
        cache_dir,
        jobs,
        dry_run,
        keep_failed,
        clean,
        step_timeout,
      },
      output,
    ),
    Commands::Info { prefix } => cmd_info(prefix, output),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}
