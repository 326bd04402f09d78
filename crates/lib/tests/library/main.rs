mod common;
mod judge_manifest_tests;
mod provision_tests;
