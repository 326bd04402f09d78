mod info;
mod invocation;
mod link_order;
mod order;
mod provision;

use std::path::Path;

use anyhow::{Context, Result};
use judgebox_lib::manifest::{Manifest, load_manifest};
use tracing::debug;

pub use info::cmd_info;
pub use invocation::cmd_invocation;
pub use link_order::cmd_link_order;
pub use order::cmd_order;
pub use provision::{ProvisionArgs, cmd_provision};

/// Load a manifest and apply the environment overrides.
fn load(path: &Path) -> Result<Manifest> {
  let mut manifest =
    load_manifest(path).with_context(|| format!("Failed to load manifest: {}", path.display()))?;
  manifest
    .settings
    .apply_env_overrides()
    .context("Invalid environment override")?;
  debug!(prefix = %manifest.settings.prefix.display(), "settings resolved");
  Ok(manifest)
}
