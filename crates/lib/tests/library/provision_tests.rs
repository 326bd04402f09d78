//! End-to-end provisioning from local fixtures, with the package manager
//! replaced by no-op commands.

use std::fs;
use std::path::Path;

use judgebox_lib::build::{BuildError, BuildStep, StepError};
use judgebox_lib::manifest::{Manifest, Settings};
use judgebox_lib::prefix::PrefixError;
use judgebox_lib::provision::{ProvisionError, ProvisionOptions, provision, record_path};
use judgebox_lib::registry::{
  CopyRule, HeaderCopyRecipe, PackageSpec, Recipe, RewriteRule, SourceLocator, SystemPackageRecipe,
};
use judgebox_lib::toolchain::PackageManagerSettings;
use tempfile::TempDir;

fn spec(name: &str, recipe: Recipe, targets: &[&str]) -> PackageSpec {
  PackageSpec {
    name: name.to_string(),
    version: "1.0".to_string(),
    source: SourceLocator::None,
    requires: Vec::new(),
    recipe,
    params: Default::default(),
    targets: targets.iter().map(|t| t.to_string()).collect(),
    include_dirs: Vec::new(),
    prune: Vec::new(),
    supersedes: Vec::new(),
    env: Default::default(),
  }
}

fn copy(from: &str, to: &str) -> CopyRule {
  CopyRule {
    from: from.to_string(),
    to: to.to_string(),
    exclude: Vec::new(),
  }
}

/// A header-only package and an OS package relocated from a fake system tree.
fn manifest_in(root: &Path) -> Manifest {
  let vendor = root.join("vendor/immer");
  fs::create_dir_all(vendor.join("immer/detail")).unwrap();
  fs::write(vendor.join("immer/vector.hpp"), "#pragma once\n").unwrap();
  fs::write(vendor.join("immer/detail/util.hpp"), "#pragma once\n").unwrap();

  let system = root.join("usr");
  fs::create_dir_all(system.join("include/eigen3/Eigen")).unwrap();
  fs::create_dir_all(system.join("share/eigen3/cmake")).unwrap();
  fs::write(system.join("include/eigen3/Eigen/Dense"), "// dense\n").unwrap();
  fs::write(
    system.join("share/eigen3/cmake/Eigen3Targets.cmake"),
    format!("INTERFACE_INCLUDE_DIRECTORIES \"{}/include/eigen3\"\n", system.display()),
  )
  .unwrap();

  let mut immer = spec(
    "immer",
    Recipe::HeaderCopy(HeaderCopyRecipe {
      copy: vec![copy("immer", "include/immer")],
      rewrite: Vec::new(),
    }),
    &["include/immer"],
  );
  immer.source = SourceLocator::Path {
    path: vendor,
    sha256: None,
    strip_components: 1,
  };

  let eigen = spec(
    "eigen",
    Recipe::SystemPackage(SystemPackageRecipe {
      package: "libeigen3-dev".to_string(),
      version: Some("3.4.0-4".to_string()),
      relocate: vec![
        copy(&system.join("include/eigen3").display().to_string(), "include"),
        copy(
          &system.join("share/eigen3/cmake/Eigen3Targets.cmake").display().to_string(),
          "cmake/Eigen3Targets.cmake",
        ),
      ],
      rewrite: vec![RewriteRule {
        file: "cmake/Eigen3Targets.cmake".to_string(),
        from: format!("{}/include/eigen3", system.display()),
        to: "$${prefix}/include".to_string(),
      }],
      remove: true,
    }),
    &["include/Eigen", "cmake/Eigen3"],
  );

  Manifest {
    settings: Settings {
      prefix: root.join("opt/gcc"),
      marker: root.join("etc/install_dir.txt"),
      wrapper: root.join("bin/judgebox-compile"),
      cache_dir: Some(root.join("cache")),
      work_dir: Some(root.join("work")),
      package_manager: PackageManagerSettings {
        refresh: None,
        install: "true".to_string(),
        remove: "true".to_string(),
      },
      ..Default::default()
    },
    packages: vec![immer, eigen],
    libraries: Vec::new(),
  }
}

fn build_failure(err: ProvisionError) -> BuildError {
  match err {
    ProvisionError::Build(err) => err,
    other => panic!("expected build failure, got {other}"),
  }
}

fn workspaces_left(root: &Path) -> usize {
  fs::read_dir(root.join("work")).map(|entries| entries.count()).unwrap_or(0)
}

#[tokio::test]
async fn header_and_system_packages_share_one_prefix() {
  let temp = TempDir::new().unwrap();
  let root = temp.path();
  let manifest = manifest_in(root);

  let report = provision(&manifest, &ProvisionOptions::default()).await.unwrap();

  let prefix = root.join("opt/gcc");
  assert!(prefix.join("include/immer/vector.hpp").exists());
  assert!(prefix.join("include/immer/detail/util.hpp").exists());
  assert!(prefix.join("include/Eigen/Dense").exists());

  let targets = fs::read_to_string(prefix.join("cmake/Eigen3Targets.cmake")).unwrap();
  assert_eq!(
    targets,
    format!("INTERFACE_INCLUDE_DIRECTORIES \"{}/include\"\n", prefix.display())
  );

  assert_eq!(report.builds.len(), 2);
  assert!(record_path(&prefix).exists());
  assert_eq!(workspaces_left(root), 0);
}

#[tokio::test]
async fn failing_step_discards_prefix_and_workspace() {
  let temp = TempDir::new().unwrap();
  let root = temp.path();
  let mut manifest = manifest_in(root);
  manifest.settings.package_manager.install = "false".to_string();

  let err = provision(&manifest, &ProvisionOptions::default()).await.unwrap_err();

  let err = build_failure(err);
  assert_eq!(err.package, "eigen");
  assert_eq!(err.step, BuildStep::Install);
  assert!(matches!(err.source, StepError::Command { .. }));

  assert!(!root.join("opt/gcc").exists());
  assert!(!root.join("bin/judgebox-compile").exists());
  assert_eq!(workspaces_left(root), 0);
}

#[tokio::test]
async fn writing_outside_targets_is_rejected() {
  let temp = TempDir::new().unwrap();
  let root = temp.path();
  let mut manifest = manifest_in(root);
  manifest.packages[0].targets = vec!["include/immer/detail".to_string()];

  let err = provision(&manifest, &ProvisionOptions::default()).await.unwrap_err();

  let err = build_failure(err);
  assert_eq!(err.package, "immer");
  assert!(matches!(
    err.source,
    StepError::Prefix(PrefixError::Violation { ref path, .. }) if path == "include/immer/vector.hpp"
  ));
  assert!(!root.join("opt/gcc").exists());
}
