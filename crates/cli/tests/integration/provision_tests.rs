//! Tests for `judgebox provision` and `judgebox info` on a header-only manifest.

use std::fs;

use predicates::prelude::*;
use serde_json::Value;

use crate::common::TestEnv;

#[test]
fn provision_installs_headers_and_artifacts() {
  let env = TestEnv::header_only();

  env
    .provision()
    .assert()
    .success()
    .stdout(predicate::str::contains("ac-library 1.5.1"))
    .stdout(predicate::str::contains("nlohmann-json 3.11.3"));

  let prefix = env.prefix();
  assert!(prefix.join("include/atcoder/dsu.hpp").exists());
  assert!(prefix.join("include/atcoder/modint.hpp").exists());
  assert!(prefix.join("include/nlohmann/json.hpp").exists());
  assert!(!prefix.join("README.md").exists());

  assert_eq!(fs::read_to_string(env.marker()).unwrap().trim(), prefix.display().to_string());

  let info = fs::read_to_string(prefix.join("container-info.txt")).unwrap();
  assert_eq!(info, "ac-library 1.5.1\nnlohmann-json 3.11.3\n");

  let script = fs::read_to_string(env.wrapper()).unwrap();
  assert!(script.contains(&format!("$(cat {})", env.marker().display())));
}

#[cfg(unix)]
#[test]
fn provision_makes_wrapper_executable() {
  use std::os::unix::fs::PermissionsExt;

  let env = TestEnv::header_only();
  env.provision().assert().success();

  let mode = fs::metadata(env.wrapper()).unwrap().permissions().mode();
  assert_eq!(mode & 0o111, 0o111);
}

#[test]
fn provision_writes_build_record() {
  let env = TestEnv::header_only();
  env.provision().assert().success();

  let record: Value =
    serde_json::from_str(&fs::read_to_string(env.prefix().join("build-record.json")).unwrap()).unwrap();
  let packages: Vec<&str> = record["packages"]
    .as_array()
    .unwrap()
    .iter()
    .map(|p| p["package"].as_str().unwrap())
    .collect();
  assert_eq!(packages, vec!["ac-library", "nlohmann-json"]);
  assert_eq!(record["prefix"], Value::String(env.prefix().display().to_string()));
}

#[test]
fn info_reads_build_record() {
  let env = TestEnv::header_only();
  env.provision().assert().success();

  env
    .cmd()
    .arg("info")
    .arg("--prefix")
    .arg(env.prefix())
    .assert()
    .success()
    .stdout(predicate::str::contains("ac-library 1.5.1 (header-copy"))
    .stdout(predicate::str::contains("nlohmann-json 3.11.3"));
}

#[test]
fn provision_refuses_existing_prefix() {
  let env = TestEnv::header_only();
  env.provision().assert().success();

  env.provision().assert().failure();
  assert!(env.prefix().join("include/atcoder/dsu.hpp").exists());
}

#[test]
fn provision_clean_rebuilds_existing_prefix() {
  let env = TestEnv::header_only();
  env.provision().assert().success();
  fs::write(env.prefix().join("stale.txt"), "left over").unwrap();

  env.provision().arg("--clean").assert().success();

  assert!(!env.prefix().join("stale.txt").exists());
  assert!(env.prefix().join("include/nlohmann/json.hpp").exists());
}

#[test]
fn failed_provision_discards_prefix() {
  let env = TestEnv::header_only();
  fs::remove_dir_all(env.temp.path().join("vendor/json")).unwrap();

  env
    .provision()
    .assert()
    .failure()
    .stderr(predicate::str::contains("nlohmann-json"));

  assert!(!env.prefix().exists());
  assert!(!env.wrapper().exists());
}

#[test]
fn failed_provision_keeps_prefix_on_request() {
  let env = TestEnv::header_only();
  fs::remove_dir_all(env.temp.path().join("vendor/json")).unwrap();

  env.provision().arg("--keep-failed").assert().failure();

  assert!(env.prefix().join("include/atcoder/dsu.hpp").exists());
}

#[test]
fn dry_run_builds_nothing() {
  let env = TestEnv::header_only();

  env
    .provision()
    .arg("--dry-run")
    .assert()
    .success()
    .stdout(predicate::str::contains("ac-library 1.5.1"))
    .stdout(predicate::str::contains("include/atcoder"));

  assert!(!env.prefix().exists());
}

#[test]
fn prefix_flag_overrides_manifest() {
  let env = TestEnv::header_only();
  let other = env.root().join("elsewhere");

  env.provision().arg("--prefix").arg(&other).assert().success();

  assert!(other.join("include/atcoder/dsu.hpp").exists());
  assert!(!env.prefix().exists());
  assert_eq!(fs::read_to_string(env.marker()).unwrap().trim(), other.display().to_string());
}

#[test]
fn provision_json_summary() {
  let env = TestEnv::header_only();

  let output = env.provision().args(["--format", "json"]).output().unwrap();
  assert!(output.status.success());

  let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(summary["packages"][0]["name"], "ac-library");
  assert_eq!(summary["packages"][0]["files"], 2);
  assert_eq!(summary["link_order"], serde_json::json!([]));
}

#[test]
fn relative_locations_resolve_from_working_directory() {
  let env = TestEnv::from_fixture("relative_prefix.json");
  env.write_file("vendor/hello/README", "hello\n");

  env.provision().current_dir(env.root()).assert().success();

  let prefix = env.root().join("out/gcc");
  assert_eq!(fs::read_to_string(prefix.join("bin/hello")).unwrap(), "hi\n");
  assert_eq!(
    fs::read_to_string(env.root().join("out/install_dir.txt")).unwrap().trim(),
    prefix.display().to_string()
  );
  assert!(env.root().join("out/judge-compile").exists());
}

#[test]
fn relative_prefix_flag_resolves_from_working_directory() {
  let env = TestEnv::from_fixture("relative_prefix.json");
  env.write_file("vendor/hello/README", "hello\n");

  env
    .provision()
    .args(["--prefix", "elsewhere"])
    .current_dir(env.root())
    .assert()
    .success();

  assert!(env.root().join("elsewhere/bin/hello").exists());
  assert!(!env.root().join("out/gcc").exists());
}
