//! Static-link ordering.
//!
//! A single-pass linker walks archives left to right and only pulls objects
//! that satisfy symbols still undefined at that point. The link block must
//! therefore list every library before the libraries it references. This
//! module derives that order from a dependency-annotated library list.

mod resolve;
mod types;

pub use resolve::resolve;
pub use types::*;
