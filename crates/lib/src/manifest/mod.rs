//! Provisioning manifests.
//!
//! A manifest declares the packages to build, the static libraries to link
//! and the run settings. It is written either as JSON or as a Lua script
//! returning the same table shape.

mod load;
mod types;

pub use load::load_manifest;
pub use types::*;
