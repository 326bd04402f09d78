//! Implementation of the `judgebox order` command.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use judgebox_lib::provision::Plan;

use crate::output::{OutputFormat, print_json};

#[derive(Debug, Serialize)]
struct OrderEntry<'a> {
  name: &'a str,
  version: &'a str,
  kind: String,
  requires: &'a [String],
}

/// Print the package build order.
pub fn cmd_order(manifest: &Path, output: OutputFormat) -> Result<()> {
  let manifest = super::load(manifest)?;
  let plan = Plan::from_manifest(&manifest).context("Failed to resolve build order")?;

  let entries: Vec<_> = plan
    .packages()
    .map(|spec| OrderEntry {
      name: &spec.name,
      version: &spec.version,
      kind: spec.recipe.kind().to_string(),
      requires: &spec.requires,
    })
    .collect();

  if output.is_json() {
    return print_json(&entries);
  }

  for (i, entry) in entries.iter().enumerate() {
    println!("{:>3}. {} {} ({})", i + 1, entry.name, entry.version, entry.kind);
  }

  Ok(())
}
