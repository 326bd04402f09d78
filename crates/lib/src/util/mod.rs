//! Shared utilities.

use std::path::Path;

pub mod hash;

#[cfg(test)]
pub mod testutil;

/// `/`-separated path of `path` relative to `root`.
pub fn relative_key(root: &Path, path: &Path) -> String {
  path
    .strip_prefix(root)
    .unwrap_or(path)
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}
