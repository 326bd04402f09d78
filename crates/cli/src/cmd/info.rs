//! Implementation of the `judgebox info` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use judgebox_lib::consts::DEFAULT_PREFIX;
use judgebox_lib::manifest::PREFIX_ENV;
use judgebox_lib::provision::{BuildRecord, record_path};

use crate::output::{OutputFormat, format_duration, print_json, print_stat, short_digest};

/// Show what a provisioned prefix contains, from its build record.
pub fn cmd_info(prefix: Option<PathBuf>, output: OutputFormat) -> Result<()> {
  let prefix = prefix
    .or_else(|| std::env::var_os(PREFIX_ENV).filter(|v| !v.is_empty()).map(PathBuf::from))
    .unwrap_or_else(|| PathBuf::from(DEFAULT_PREFIX));

  let record = read_record(&prefix)?;

  if output.is_json() {
    return print_json(&record);
  }

  print_stat("Prefix", &record.prefix.display().to_string());
  print_stat("Version", &record.judgebox_version);
  print_stat("Manifest", short_digest(&record.manifest_digest.0));
  println!();
  for package in &record.packages {
    println!(
      "  {} {} ({}, {} files, {})",
      package.package,
      package.version,
      package.kind,
      package.changes.added.len(),
      format_duration(package.duration)
    );
  }
  if !record.link_order.is_empty() {
    println!();
    print_stat("Link order", &record.link_order.join(" "));
  }

  Ok(())
}

fn read_record(prefix: &Path) -> Result<BuildRecord> {
  let path = record_path(prefix);
  let content = std::fs::read_to_string(&path)
    .with_context(|| format!("No build record at {} (has the prefix been provisioned?)", path.display()))?;
  serde_json::from_str(&content).with_context(|| format!("Corrupt build record: {}", path.display()))
}
