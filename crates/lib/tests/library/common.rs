//! Shared helpers for library integration tests.

use std::path::PathBuf;

use judgebox_lib::manifest::{Manifest, load_manifest};

/// Path of the bundled judge manifest.
pub fn judge_manifest_path() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("..")
    .join("..")
    .join("manifests")
    .join("judge.lua")
}

pub fn judge_manifest() -> Manifest {
  load_manifest(&judge_manifest_path()).unwrap_or_else(|e| panic!("failed to load judge manifest: {e}"))
}
