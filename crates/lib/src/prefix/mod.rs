//! The shared install prefix.
//!
//! A prefix is created empty once per run and then only grows: each package
//! build is bracketed by two fingerprints of the tree, and the difference is
//! checked against the package's declared install targets before it is
//! recorded in the ownership ledger.

mod lock;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::consts::PREFIX_LAYOUT;
use crate::registry::PackageSpec;
use crate::util::relative_key;

pub use lock::{LockMetadata, PrefixLock, PrefixLockError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
  Added,
  Modified,
  Removed,
}

impl fmt::Display for ChangeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ChangeKind::Added => write!(f, "added"),
      ChangeKind::Modified => write!(f, "modified"),
      ChangeKind::Removed => write!(f, "removed"),
    }
  }
}

#[derive(Debug, Error)]
pub enum PrefixError {
  #[error("i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("prefix {0} already exists and is not empty")]
  NotEmpty(PathBuf),

  #[error("package '{package}' {change} '{path}' outside its install targets")]
  Violation {
    package: String,
    path: String,
    change: ChangeKind,
  },

  #[error("failed to walk prefix: {0}")]
  Walk(#[from] walkdir::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PrefixError + '_ {
  move |source| PrefixError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// What identifies a file or symlink between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Stamp {
  File { len: u64, modified: Option<SystemTime> },
  Symlink(PathBuf),
}

/// Snapshot of every non-directory entry under the prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint(BTreeMap<String, Stamp>);

impl Fingerprint {
  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn contains(&self, relative: &str) -> bool {
    self.0.contains_key(relative)
  }
}

/// Paths one package build added, changed or deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixChanges {
  pub added: Vec<String>,
  pub modified: Vec<String>,
  pub removed: Vec<String>,
}

impl PrefixChanges {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
  }
}

/// An installed package as recorded by the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
  pub name: String,
  pub version: String,
}

#[derive(Debug)]
pub struct InstallPrefix {
  root: PathBuf,
  /// Prefix-relative path to owning package.
  ledger: BTreeMap<String, String>,
  installed: Vec<InstalledPackage>,
}

impl InstallPrefix {
  /// Create a fresh prefix with the standard layout. An existing non-empty
  /// directory is refused; runs never resume on a partial tree.
  pub fn create(root: &Path) -> Result<Self, PrefixError> {
    if root.exists() {
      let mut entries = std::fs::read_dir(root).map_err(io_err(root))?;
      if entries.next().is_some() {
        return Err(PrefixError::NotEmpty(root.to_path_buf()));
      }
    }

    for dir in PREFIX_LAYOUT {
      let path = root.join(dir);
      std::fs::create_dir_all(&path).map_err(io_err(&path))?;
    }

    info!(prefix = %root.display(), "created install prefix");

    Ok(Self {
      root: root.to_path_buf(),
      ledger: BTreeMap::new(),
      installed: Vec::new(),
    })
  }

  /// Remove a prefix left behind by an earlier run.
  pub fn clean(root: &Path) -> Result<(), PrefixError> {
    if root.exists() {
      warn!(prefix = %root.display(), "removing existing prefix");
      std::fs::remove_dir_all(root).map_err(io_err(root))?;
    }
    Ok(())
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn installed(&self) -> &[InstalledPackage] {
    &self.installed
  }

  pub fn ledger(&self) -> &BTreeMap<String, String> {
    &self.ledger
  }

  /// Package that last installed `relative`.
  pub fn owner(&self, relative: &str) -> Option<&str> {
    self.ledger.get(relative).map(String::as_str)
  }

  pub fn fingerprint(&self) -> Result<Fingerprint, PrefixError> {
    let mut entries = BTreeMap::new();

    for entry in WalkDir::new(&self.root).sort_by_file_name() {
      let entry = entry?;
      let file_type = entry.file_type();
      if file_type.is_dir() {
        continue;
      }

      let path = entry.path();
      let stamp = if file_type.is_symlink() {
        Stamp::Symlink(std::fs::read_link(path).map_err(io_err(path))?)
      } else {
        let metadata = entry.metadata()?;
        Stamp::File {
          len: metadata.len(),
          modified: metadata.modified().ok(),
        }
      };

      entries.insert(relative_key(&self.root, path), stamp);
    }

    Ok(Fingerprint(entries))
  }

  /// Diff the tree against `before`, check the changes against the
  /// ownership rules of `spec` and record them.
  pub fn record(&mut self, spec: &PackageSpec, before: &Fingerprint) -> Result<PrefixChanges, PrefixError> {
    let after = self.fingerprint()?;
    let mut changes = PrefixChanges::default();

    for (path, stamp) in &after.0 {
      match before.0.get(path) {
        None => changes.added.push(path.clone()),
        Some(old) if old != stamp => changes.modified.push(path.clone()),
        Some(_) => {}
      }
    }
    changes.removed = before.0.keys().filter(|p| !after.0.contains_key(*p)).cloned().collect();

    let violation = |path: &String, change| PrefixError::Violation {
      package: spec.name.clone(),
      path: path.clone(),
      change,
    };

    if let Some(path) = changes.added.iter().find(|p| !spec.owns_target(p)) {
      return Err(violation(path, ChangeKind::Added));
    }
    if let Some(path) = changes.modified.iter().find(|p| !spec.owns_target(p)) {
      return Err(violation(path, ChangeKind::Modified));
    }
    if let Some(path) = changes.removed.iter().find(|p| !spec.may_supersede(p)) {
      return Err(violation(path, ChangeKind::Removed));
    }

    for path in &changes.removed {
      self.ledger.remove(path);
    }
    for path in changes.added.iter().chain(&changes.modified) {
      if let Some(previous) = self.ledger.insert(path.clone(), spec.name.clone())
        && previous != spec.name
      {
        debug!(path = %path, from = %previous, to = %spec.name, "ownership transferred");
      }
    }

    self.installed.push(InstalledPackage {
      name: spec.name.clone(),
      version: spec.version.clone(),
    });

    debug!(
      package = %spec.name,
      added = changes.added.len(),
      modified = changes.modified.len(),
      removed = changes.removed.len(),
      "recorded prefix changes"
    );

    Ok(changes)
  }

  /// Write the marker file recording the prefix root.
  pub fn write_marker(&self, marker: &Path) -> Result<(), PrefixError> {
    if let Some(parent) = marker.parent() {
      std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    std::fs::write(marker, format!("{}\n", self.root.display())).map_err(io_err(marker))
  }

  /// Delete the whole prefix after a failed run.
  pub fn discard(self) -> Result<(), PrefixError> {
    warn!(prefix = %self.root.display(), "discarding install prefix");
    std::fs::remove_dir_all(&self.root).map_err(io_err(&self.root))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::package;
  use std::fs;
  use tempfile::TempDir;

  fn spec_with_targets(name: &str, targets: &[&str]) -> PackageSpec {
    let mut spec = package(name, &[]);
    spec.targets = targets.iter().map(|t| t.to_string()).collect();
    spec
  }

  #[test]
  fn create_lays_out_standard_directories() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("gcc");

    let prefix = InstallPrefix::create(&root).unwrap();

    for dir in PREFIX_LAYOUT {
      assert!(prefix.root().join(dir).is_dir(), "missing {dir}");
    }
    assert!(prefix.fingerprint().unwrap().is_empty());
  }

  #[test]
  fn create_refuses_non_empty_directory() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("leftover"), "x").unwrap();

    let err = InstallPrefix::create(temp.path()).unwrap_err();
    assert!(matches!(err, PrefixError::NotEmpty(_)));
  }

  #[test]
  fn records_files_within_targets() {
    let temp = TempDir::new().unwrap();
    let mut prefix = InstallPrefix::create(&temp.path().join("p")).unwrap();
    let spec = spec_with_targets("ac-library", &["include/atcoder"]);

    let before = prefix.fingerprint().unwrap();
    fs::create_dir_all(prefix.root().join("include/atcoder")).unwrap();
    fs::write(prefix.root().join("include/atcoder/dsu.hpp"), "#pragma once").unwrap();

    let changes = prefix.record(&spec, &before).unwrap();

    assert_eq!(changes.added, vec!["include/atcoder/dsu.hpp"]);
    assert_eq!(prefix.owner("include/atcoder/dsu.hpp"), Some("ac-library"));
    assert_eq!(prefix.installed()[0].name, "ac-library");
  }

  #[test]
  fn write_outside_targets_is_a_violation() {
    let temp = TempDir::new().unwrap();
    let mut prefix = InstallPrefix::create(&temp.path().join("p")).unwrap();
    let spec = spec_with_targets("eigen", &["include/eigen3"]);

    let before = prefix.fingerprint().unwrap();
    fs::write(prefix.root().join("lib/libstray.a"), "!<arch>").unwrap();

    let err = prefix.record(&spec, &before).unwrap_err();
    assert!(matches!(
      err,
      PrefixError::Violation { ref path, change: ChangeKind::Added, .. } if path == "lib/libstray.a"
    ));
  }

  #[test]
  fn deleting_another_package_file_needs_supersedes() {
    let temp = TempDir::new().unwrap();
    let mut prefix = InstallPrefix::create(&temp.path().join("p")).unwrap();

    let gmp = spec_with_targets("gmp", &["include/gmp"]);
    let before = prefix.fingerprint().unwrap();
    fs::write(prefix.root().join("include/gmp.h"), "gmp").unwrap();
    fs::write(prefix.root().join("include/gmpxx.h"), "gmpxx").unwrap();
    prefix.record(&gmp, &before).unwrap();

    let mut boost = spec_with_targets("boost", &["include/boost"]);
    let before = prefix.fingerprint().unwrap();
    fs::remove_file(prefix.root().join("include/gmpxx.h")).unwrap();
    let err = prefix.record(&boost, &before).unwrap_err();
    assert!(matches!(err, PrefixError::Violation { change: ChangeKind::Removed, .. }));

    boost.supersedes = vec!["include/gmpxx.h".to_string()];
    let changes = prefix.record(&boost, &before).unwrap();
    assert_eq!(changes.removed, vec!["include/gmpxx.h"]);
    assert_eq!(prefix.owner("include/gmpxx.h"), None);
    assert_eq!(prefix.owner("include/gmp.h"), Some("gmp"));
  }

  #[test]
  fn overwriting_own_target_transfers_ownership() {
    let temp = TempDir::new().unwrap();
    let mut prefix = InstallPrefix::create(&temp.path().join("p")).unwrap();

    let gcc = spec_with_targets("gcc", &["lib64/"]);
    let before = prefix.fingerprint().unwrap();
    fs::write(prefix.root().join("lib64/libgomp.a"), "old").unwrap();
    prefix.record(&gcc, &before).unwrap();

    let rebuild = spec_with_targets("libgomp", &["lib64/libgomp"]);
    let before = prefix.fingerprint().unwrap();
    fs::write(prefix.root().join("lib64/libgomp.a"), "rebuilt archive").unwrap();
    let changes = prefix.record(&rebuild, &before).unwrap();

    assert_eq!(changes.modified, vec!["lib64/libgomp.a"]);
    assert_eq!(prefix.owner("lib64/libgomp.a"), Some("libgomp"));
  }

  #[test]
  fn marker_records_root() {
    let temp = TempDir::new().unwrap();
    let prefix = InstallPrefix::create(&temp.path().join("p")).unwrap();
    let marker = temp.path().join("etc/install_dir.txt");

    prefix.write_marker(&marker).unwrap();

    assert_eq!(
      fs::read_to_string(&marker).unwrap(),
      format!("{}\n", prefix.root().display())
    );
  }

  #[test]
  fn discard_removes_tree() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("p");
    let prefix = InstallPrefix::create(&root).unwrap();
    fs::write(root.join("bin/gcc"), "").unwrap();

    prefix.discard().unwrap();
    assert!(!root.exists());
  }
}
