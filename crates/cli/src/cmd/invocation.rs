//! Implementation of the `judgebox invocation` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use judgebox_lib::provision::Plan;

use crate::output::{OutputFormat, print_json};

/// Print the compile command, or the wrapper script with `script`.
pub fn cmd_invocation(manifest: &Path, prefix: Option<PathBuf>, script: bool, output: OutputFormat) -> Result<()> {
  let manifest = super::load(manifest)?;
  let plan = Plan::from_manifest(&manifest).context("Failed to synthesize invocation")?;
  let invocation = plan.invocation();

  if script {
    let script = invocation
      .wrapper_script(&manifest.settings.marker)
      .context("Failed to render wrapper script")?;
    print!("{script}");
    return Ok(());
  }

  let prefix = prefix.unwrap_or_else(|| manifest.settings.prefix.clone());
  if output.is_json() {
    let resolved = invocation.resolve(&prefix).context("Failed to resolve invocation")?;
    return print_json(&resolved);
  }

  let line = invocation
    .command_line(&prefix, None)
    .context("Failed to render command line")?;
  println!("{line}");

  Ok(())
}
