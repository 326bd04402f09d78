//! Implementation of the `judgebox provision` command.
//!
//! Builds every package of the manifest into a fresh prefix, then writes the
//! marker, the compile wrapper, the info file and the build record.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use judgebox_lib::provision::{self, ProvisionOptions};

use crate::output::{OutputFormat, format_duration, print_json, print_stat, print_step, print_success, print_warning};

/// Flags that override the manifest settings for one run.
#[derive(Debug, Default)]
pub struct ProvisionArgs {
  pub prefix: Option<PathBuf>,
  pub cache_dir: Option<PathBuf>,
  pub jobs: Option<usize>,
  pub dry_run: bool,
  pub keep_failed: bool,
  pub clean: bool,
  pub step_timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
struct ProvisionSummary<'a> {
  prefix: &'a Path,
  packages: Vec<PackageSummary<'a>>,
  link_order: &'a [String],
  wrapper: &'a Path,
  marker: &'a Path,
  info: &'a Path,
  record: &'a Path,
  duration_secs: f64,
}

#[derive(Debug, Serialize)]
struct PackageSummary<'a> {
  name: &'a str,
  version: &'a str,
  files: usize,
  duration_secs: f64,
}

pub fn cmd_provision(manifest_path: &Path, args: ProvisionArgs, output: OutputFormat) -> Result<()> {
  let mut manifest = super::load(manifest_path)?;
  if let Some(prefix) = args.prefix {
    manifest.settings.prefix = prefix;
  }
  if let Some(cache_dir) = args.cache_dir {
    manifest.settings.cache_dir = Some(cache_dir);
  }
  if let Some(jobs) = args.jobs {
    manifest.settings.toolchain.jobs = Some(jobs.max(1));
  }

  let options = ProvisionOptions {
    keep_failed: args.keep_failed,
    clean: args.clean,
    step_timeout: args.step_timeout,
    command: std::env::args().collect::<Vec<_>>().join(" "),
  };

  if args.dry_run {
    let plans = provision::describe(&manifest, &options).context("Dry run failed")?;
    if output.is_json() {
      return print_json(&plans);
    }
    for plan in &plans {
      println!("{} {}", plan.package, plan.version);
      for step in &plan.steps {
        print_step(&step.step.to_string(), &step.detail);
      }
    }
    return Ok(());
  }

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(provision::provision(&manifest, &options))
    .context("Provisioning failed")?;

  if output.is_json() {
    let summary = ProvisionSummary {
      prefix: &report.prefix,
      packages: report
        .builds
        .iter()
        .map(|b| PackageSummary {
          name: &b.package,
          version: &b.version,
          files: b.changes.added.len() + b.changes.modified.len(),
          duration_secs: b.duration.as_secs_f64(),
        })
        .collect(),
      link_order: &report.link_order.tokens,
      wrapper: &report.wrapper,
      marker: &report.marker,
      info: &report.info,
      record: &report.record,
      duration_secs: report.duration.as_secs_f64(),
    };
    return print_json(&summary);
  }

  for build in &report.builds {
    print_success(&format!(
      "{} {} ({}, {})",
      build.package,
      build.version,
      build.kind,
      format_duration(build.duration)
    ));
  }
  for diagnostic in &report.link_order.diagnostics {
    print_warning(&diagnostic.to_string());
  }

  println!();
  print_stat("Prefix", &report.prefix.display().to_string());
  print_stat("Packages", &report.builds.len().to_string());
  print_stat("Link order", &report.link_order.flags().join(" "));
  print_stat("Wrapper", &report.wrapper.display().to_string());
  print_stat("Record", &report.record.display().to_string());
  print_stat("Duration", &format_duration(report.duration));

  Ok(())
}
