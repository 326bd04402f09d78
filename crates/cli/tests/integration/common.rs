//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the manifest, the
/// vendored sources and everything a provisioning run writes.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file, keeping its extension.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let extension = Path::new(name).extension().and_then(|e| e.to_str()).unwrap_or("lua");
    let manifest_path = temp.path().join(format!("judge.{extension}"));
    std::fs::write(&manifest_path, fixture_content(name)).unwrap();
    Self { temp, manifest_path }
  }

  /// The header-only fixture with its vendored sources in place.
  pub fn header_only() -> Self {
    let env = Self::from_fixture("header_only.lua");
    env.write_file(
      "vendor/ac-library/atcoder/dsu.hpp",
      "#pragma once\nnamespace atcoder { struct dsu {}; }\n",
    );
    env.write_file(
      "vendor/ac-library/atcoder/modint.hpp",
      "#pragma once\nnamespace atcoder { struct modint {}; }\n",
    );
    env.write_file("vendor/ac-library/README.md", "AtCoder Library\n");
    env.write_file(
      "vendor/json/single_include/nlohmann/json.hpp",
      "#pragma once\nnamespace nlohmann { struct json {}; }\n",
    );
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Canonical root of the test directory, as the manifest sees it.
  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  pub fn prefix(&self) -> PathBuf {
    self.root().join("prefix")
  }

  pub fn wrapper(&self) -> PathBuf {
    self.root().join("bin").join("judge-compile")
  }

  pub fn marker(&self) -> PathBuf {
    self.root().join("etc").join("install_dir.txt")
  }

  /// Get a command with isolated environment variables.
  pub fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("judgebox");
    cmd
      .env_remove("JUDGEBOX_PREFIX")
      .env_remove("JUDGEBOX_CACHE_DIR")
      .env_remove("JUDGEBOX_JOBS")
      .env("TMPDIR", self.temp.path().join("tmp"));
    std::fs::create_dir_all(self.temp.path().join("tmp")).unwrap();
    cmd
  }

  /// `judgebox provision` on this environment's manifest.
  pub fn provision(&self) -> Command {
    let mut cmd = self.cmd();
    cmd.arg("provision").arg(&self.manifest_path);
    cmd
  }
}
