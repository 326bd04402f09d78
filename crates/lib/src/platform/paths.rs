use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Returns the user's home directory, if known.
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").filter(|h| !h.is_empty()).map(PathBuf::from)
}

/// Returns the compiler cache directory shared by all package builds.
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var_os("XDG_CACHE_HOME")
    .filter(|c| !c.is_empty())
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|h| h.join(".cache")))
    .unwrap_or_else(std::env::temp_dir);
  cache_home.join(APP_NAME)
}

/// Returns the directory holding per-package build workspaces.
pub fn work_dir() -> PathBuf {
  std::env::temp_dir().join(APP_NAME)
}
