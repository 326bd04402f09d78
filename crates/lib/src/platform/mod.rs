//! Host facts the provisioner depends on.

pub mod paths;

use std::num::NonZeroUsize;

/// Extra jobs on top of the CPU count.
const JOBS_OVERSUBSCRIPTION: usize = 2;

/// Default build parallelism for this host.
pub fn default_jobs() -> usize {
  std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1) + JOBS_OVERSUBSCRIPTION
}

/// The host's `PATH`, or a minimal system path when unset.
pub fn host_path() -> String {
  std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".to_string())
}
