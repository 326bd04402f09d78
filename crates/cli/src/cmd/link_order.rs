//! Implementation of the `judgebox link-order` command.

use std::path::Path;

use anyhow::{Context, Result};

use judgebox_lib::link;

use crate::output::{OutputFormat, print_json, print_warning};

/// Print the static-link block and any repeated-token diagnostics.
pub fn cmd_link_order(manifest: &Path, output: OutputFormat) -> Result<()> {
  let manifest = super::load(manifest)?;
  let order = link::resolve(&manifest.libraries).context("Failed to resolve link order")?;
  order
    .check(&manifest.libraries)
    .context("Resolved link order is invalid")?;

  if output.is_json() {
    return print_json(&order);
  }

  for diagnostic in &order.diagnostics {
    print_warning(&diagnostic.to_string());
  }
  println!("{}", order.flags().join(" "));

  Ok(())
}
