//! Package and toolchain fixtures for unit tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::registry::{
  AutotoolsRecipe, BuildParams, CopyRule, HeaderCopyRecipe, PackageSpec, Recipe, SourceLocator,
};
use crate::toolchain::Toolchain;

/// An autotools package with a local source and the given prerequisites.
pub fn package(name: &str, requires: &[&str]) -> PackageSpec {
  PackageSpec {
    name: name.to_string(),
    version: "1.0".to_string(),
    source: SourceLocator::Path {
      path: PathBuf::from(format!("/src/{name}")),
      sha256: None,
      strip_components: 1,
    },
    requires: requires.iter().map(|r| r.to_string()).collect(),
    recipe: Recipe::Autotools(AutotoolsRecipe::default()),
    params: BuildParams::default(),
    targets: Vec::new(),
    include_dirs: Vec::new(),
    prune: Vec::new(),
    supersedes: Vec::new(),
    env: BTreeMap::new(),
  }
}

/// A header-only package copying `from` (source-relative) to `to`
/// (prefix-relative), which is also its only install target.
pub fn header_package(name: &str, requires: &[&str], from: &str, to: &str) -> PackageSpec {
  PackageSpec {
    recipe: Recipe::HeaderCopy(HeaderCopyRecipe {
      copy: vec![CopyRule {
        from: from.to_string(),
        to: to.to_string(),
        exclude: Vec::new(),
      }],
      rewrite: Vec::new(),
    }),
    targets: vec![to.to_string()],
    ..package(name, requires)
  }
}

/// The toolchain of a package built against `/opt/jb`.
pub fn toolchain() -> Toolchain {
  Toolchain {
    cc: "/opt/jb/bin/gcc".to_string(),
    cxx: "/opt/jb/bin/g++".to_string(),
    launcher: None,
    cflags: Vec::new(),
    cxxflags: vec!["-O2".to_string()],
    ldflags: Vec::new(),
    jobs: 4,
    cache_dir: PathBuf::from("/cache"),
  }
}
