//! Tests for the commands that only resolve a manifest.

use predicates::prelude::*;
use serde_json::Value;

use crate::common::TestEnv;

#[test]
fn order_lists_packages_prerequisites_first() {
  let env = TestEnv::from_fixture("libraries.json");

  env
    .cmd()
    .arg("order")
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::is_match(r"(?s)1\. gcc 15\.2\.0 \(autotools\).*2\. gmp 6\.3\.0.*3\. boost 1\.89\.0 \(cmake\)").unwrap());
}

#[test]
fn order_json_output() {
  let env = TestEnv::from_fixture("libraries.json");

  let output = env
    .cmd()
    .args(["--format", "json", "order"])
    .arg(&env.manifest_path)
    .output()
    .unwrap();
  assert!(output.status.success());

  let entries: Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = entries
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["name"].as_str().unwrap())
    .collect();
  assert_eq!(names, vec!["gcc", "gmp", "boost"]);
  assert_eq!(entries[2]["requires"], serde_json::json!(["gcc", "gmp"]));
}

#[test]
fn link_order_puts_dependents_first() {
  let env = TestEnv::from_fixture("libraries.json");

  env
    .cmd()
    .arg("link-order")
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout("-lboost_json -lgmpxx -lgmp\n");
}

#[test]
fn invocation_keeps_link_block_last() {
  let env = TestEnv::from_fixture("libraries.json");

  let output = env
    .cmd()
    .arg("invocation")
    .arg(&env.manifest_path)
    .args(["--prefix", "/opt/jb"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let line = String::from_utf8(output.stdout).unwrap();
  assert!(line.starts_with("/opt/jb/bin/g++ Main.cpp -o a.out "), "{line}");
  assert!(line.contains("-DBOOST_JSON_NO_LIB"), "{line}");
  assert!(line.contains("-I/opt/jb/include"), "{line}");
  assert!(line.trim_end().ends_with("-lboost_json -lgmpxx -lgmp"), "{line}");
}

#[test]
fn invocation_is_deterministic() {
  let env = TestEnv::from_fixture("libraries.json");

  let run = || {
    env
      .cmd()
      .arg("invocation")
      .arg(&env.manifest_path)
      .output()
      .unwrap()
      .stdout
  };
  assert_eq!(run(), run());
}

#[test]
fn invocation_script_reads_marker() {
  let env = TestEnv::from_fixture("libraries.json");

  env
    .cmd()
    .arg("invocation")
    .arg(&env.manifest_path)
    .arg("--script")
    .assert()
    .success()
    .stdout(predicate::str::starts_with("#!/usr/bin/env bash"))
    .stdout(predicate::str::contains("INSTALL_DIR=\"$(cat /etc/judgebox/install_dir.txt)\""))
    .stdout(predicate::str::contains("\"${INSTALL_DIR}/bin/g++\""))
    .stdout(predicate::str::contains("\"-lgmp\""));
}

#[test]
fn prefix_env_reaches_invocation() {
  let env = TestEnv::from_fixture("libraries.json");

  env
    .cmd()
    .arg("invocation")
    .arg(&env.manifest_path)
    .env("JUDGEBOX_PREFIX", "/srv/toolchain")
    .assert()
    .success()
    .stdout(predicate::str::starts_with("/srv/toolchain/bin/g++"));
}
