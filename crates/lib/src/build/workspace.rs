//! Throwaway per-package build workspace.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use super::types::StepError;

/// Scratch directory for one package. Dropping it deletes everything,
/// whether the build succeeded or not.
#[derive(Debug)]
pub struct Workspace {
  dir: TempDir,
  src: PathBuf,
  build: PathBuf,
  downloads: PathBuf,
  tmp: PathBuf,
}

impl Workspace {
  pub fn create(work_dir: &Path, package: &str) -> Result<Self, StepError> {
    std::fs::create_dir_all(work_dir).map_err(StepError::io(work_dir))?;

    let dir = tempfile::Builder::new()
      .prefix(&format!("{package}-"))
      .tempdir_in(work_dir)
      .map_err(StepError::io(work_dir))?;

    let root = dir.path();
    let workspace = Self {
      src: root.join("src"),
      build: root.join("src").join("build"),
      downloads: root.join("downloads"),
      tmp: root.join("tmp"),
      dir,
    };

    for path in [&workspace.downloads, &workspace.tmp] {
      std::fs::create_dir_all(path).map_err(StepError::io(path.as_path()))?;
    }

    debug!(package, path = %workspace.root().display(), "created workspace");
    Ok(workspace)
  }

  pub fn root(&self) -> &Path {
    self.dir.path()
  }

  /// Staged source tree.
  pub fn src(&self) -> &Path {
    &self.src
  }

  /// Out-of-tree build directory.
  pub fn build(&self) -> &Path {
    &self.build
  }

  pub fn downloads(&self) -> &Path {
    &self.downloads
  }

  pub fn tmp(&self) -> &Path {
    &self.tmp
  }

  /// Scratch path for unpacking an archive before it becomes `src`.
  pub fn unpack_dir(&self) -> PathBuf {
    self.root().join("unpack")
  }
}
