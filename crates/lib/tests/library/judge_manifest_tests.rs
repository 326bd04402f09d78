//! Tests for the bundled judge manifest.

use std::collections::HashSet;

use judgebox_lib::link;
use judgebox_lib::provision::Plan;
use judgebox_lib::registry::RecipeKind;

use super::common::judge_manifest;

#[test]
fn build_order_starts_with_the_compiler() {
  let manifest = judge_manifest();
  let plan = Plan::from_manifest(&manifest).unwrap();

  assert_eq!(plan.build_order().first().map(String::as_str), Some("gcc"));
  assert_eq!(plan.build_order().len(), manifest.packages.len());
}

#[test]
fn build_order_respects_prerequisites() {
  let manifest = judge_manifest();
  let plan = Plan::from_manifest(&manifest).unwrap();
  let position = |name: &str| plan.build_order().iter().position(|n| n == name).unwrap();

  for spec in &manifest.packages {
    for prerequisite in &spec.requires {
      assert!(
        position(prerequisite) < position(&spec.name),
        "{prerequisite} must be built before {}",
        spec.name
      );
    }
  }
}

#[test]
fn every_recipe_kind_is_used() {
  let manifest = judge_manifest();
  let kinds: HashSet<RecipeKind> = manifest.packages.iter().map(|p| p.recipe.kind()).collect();

  assert!(kinds.contains(&RecipeKind::Autotools));
  assert!(kinds.contains(&RecipeKind::Cmake));
  assert!(kinds.contains(&RecipeKind::HeaderCopy));
  assert!(kinds.contains(&RecipeKind::SystemPackage));
}

#[test]
fn link_order_is_valid_and_complete() {
  let manifest = judge_manifest();
  let order = link::resolve(&manifest.libraries).unwrap();

  order.check(&manifest.libraries).unwrap();
  assert!(order.diagnostics.is_empty());

  let emitted: HashSet<&str> = order.tokens.iter().map(String::as_str).collect();
  for node in &manifest.libraries {
    assert!(emitted.contains(node.token.as_str()), "{} missing from link order", node.token);
  }
  assert_eq!(order.tokens.len(), manifest.libraries.len());
}

#[test]
fn link_order_places_anchored_token_first() {
  let manifest = judge_manifest();
  let order = link::resolve(&manifest.libraries).unwrap();

  assert_eq!(order.tokens.first().map(String::as_str), Some("stdc++exp"));
}

#[test]
fn invocation_keeps_link_block_last() {
  let manifest = judge_manifest();
  let plan = Plan::from_manifest(&manifest).unwrap();
  let invocation = plan.invocation();

  let flags: Vec<&String> = invocation.flags().collect();
  let first_link = flags.len() - invocation.link_block.len();
  assert_eq!(flags[first_link..].iter().map(|f| f.as_str()).collect::<Vec<_>>(), invocation.link_block);
  assert!(flags[..first_link].iter().all(|f| !f.starts_with("-l")));
  assert!(invocation.preamble.contains(&"-DUSE_SCIP".to_string()));
  assert!(invocation.preamble.contains(&"-I$${prefix}/include/torch/csrc/api/include".to_string()));
}

#[test]
fn wrapper_script_is_deterministic() {
  let manifest = judge_manifest();
  let first = Plan::from_manifest(&manifest).unwrap();
  let second = Plan::from_manifest(&judge_manifest()).unwrap();

  let marker = &manifest.settings.marker;
  assert_eq!(
    first.invocation().wrapper_script(marker).unwrap(),
    second.invocation().wrapper_script(marker).unwrap()
  );
}

#[test]
fn dry_run_describes_every_package() {
  let manifest = judge_manifest();
  let plans = judgebox_lib::provision::describe(&manifest, &Default::default()).unwrap();

  assert_eq!(plans.len(), manifest.packages.len());
  let boost = plans.iter().find(|p| p.package == "boost").unwrap();
  assert!(boost.steps.iter().any(|s| s.detail.contains("./b2 toolset=gcc")));
  assert!(boost.steps.iter().any(|s| s.detail.contains("using gcc : : ccache")));
}

#[test]
fn link_block_covers_the_judge_archives() {
  let manifest = judge_manifest();
  let plan = Plan::from_manifest(&manifest).unwrap();
  let link_block = &plan.invocation().link_block;

  for archive in [
    "boost_json",
    "boost_regex",
    "boost_log_setup",
    "boost_wserialization",
    "absl_log_flags",
    "absl_die_if_null",
    "absl_failure_signal_handler",
    "ortools",
    "torch",
    "z3",
    "gmpxx",
  ] {
    let flag = format!("-l{archive}");
    assert!(link_block.contains(&flag), "{flag} missing from link block");
  }

  let boost = manifest
    .libraries
    .iter()
    .filter(|n| n.package.as_deref() == Some("boost"))
    .count();
  assert_eq!(boost, 40);
}

#[test]
fn boost_archives_precede_their_dependencies() {
  let manifest = judge_manifest();
  let order = link::resolve(&manifest.libraries).unwrap();
  let position = |token: &str| order.tokens.iter().position(|t| t == token).unwrap();

  for node in manifest.libraries.iter().filter(|n| n.token.starts_with("boost_")) {
    for dependency in &node.depends_on {
      assert!(
        position(&node.token) < position(dependency),
        "{} must come before {dependency}",
        node.token
      );
    }
  }
  assert!(position("boost_log_setup") < position("boost_log"));
  assert!(position("boost_log") < position("boost_thread"));
  assert!(position("boost_fiber") < position("boost_context"));
}

#[test]
fn packages_claim_only_their_own_trees() {
  let manifest = judge_manifest();
  let provider = manifest.settings.toolchain.provided_by.as_deref();

  for spec in manifest.packages.iter().filter(|p| Some(p.name.as_str()) != provider) {
    for target in &spec.targets {
      assert!(
        target.trim_end_matches('/').contains('/'),
        "{} claims all of {target}",
        spec.name
      );
    }
  }

  let installed_by_others = [
    "bin/g++",
    "lib/gcc/x86_64-pc-linux-gnu/15.2.0/crtbegin.o",
    "lib64/libstdc++.a",
    "lib/libabsl_base.a",
    "lib/libboost_json.a",
    "lib/cmake/absl/abslConfig.cmake",
    "include/boost/json.hpp",
    "include/Eigen/Dense",
  ];
  for name in ["libtorch", "or-tools"] {
    let spec = manifest.packages.iter().find(|p| p.name == name).unwrap();
    for path in installed_by_others {
      assert!(!spec.owns_target(path), "{name} claims {path}");
    }
  }
}
