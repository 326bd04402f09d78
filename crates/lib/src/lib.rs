//! judgebox-lib: provisioning engine for judge toolchains
//!
//! This crate provides the building blocks of a provisioning run:
//! - `registry`: validated package specifications
//! - `order`: build sequencing over prerequisite edges
//! - `build`: per-package recipe execution in throwaway workspaces
//! - `prefix`: the shared install tree and its ownership ledger
//! - `link`: static-link ordering for single-pass linkers
//! - `invocation`: the compiler command and wrapper script
//! - `provision`: the all-or-nothing orchestrator tying them together

pub mod build;
pub mod consts;
pub mod invocation;
pub mod link;
pub mod manifest;
pub mod order;
pub mod placeholder;
pub mod platform;
pub mod prefix;
pub mod provision;
pub mod registry;
pub mod toolchain;
pub mod util;
