mod common;
mod plan_tests;
mod provision_tests;
