use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build::{BuildError, BuildReport, StepDescription};
use crate::invocation::{CompileInvocation, InvocationError};
use crate::link::{LinkError, LinkOrder};
use crate::manifest::ManifestError;
use crate::order::OrderError;
use crate::prefix::{PrefixError, PrefixLockError};
use crate::registry::ConfigurationError;
use crate::util::hash::{ContentHash, HashError};

/// Errors that abort a provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Configuration(#[from] ConfigurationError),

  #[error(transparent)]
  Order(#[from] OrderError),

  #[error(transparent)]
  Link(#[from] LinkError),

  #[error(transparent)]
  Invocation(#[from] InvocationError),

  #[error(transparent)]
  Lock(#[from] PrefixLockError),

  #[error(transparent)]
  Prefix(#[from] PrefixError),

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("failed to serialize build record: {0}")]
  Record(#[from] serde_json::Error),
}

/// Per-run knobs that are not part of the manifest.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
  /// Keep the prefix of a failed run for inspection.
  pub keep_failed: bool,
  /// Delete an existing prefix before starting.
  pub clean: bool,
  pub step_timeout: Option<Duration>,
  /// Recorded in the prefix lock.
  pub command: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
  pub prefix: PathBuf,
  pub builds: Vec<BuildReport>,
  pub link_order: LinkOrder,
  pub invocation: CompileInvocation,
  pub wrapper: PathBuf,
  pub marker: PathBuf,
  pub info: PathBuf,
  pub record: PathBuf,
  pub duration: Duration,
}

/// What a dry run would do for one package.
#[derive(Debug, Clone, Serialize)]
pub struct PackagePlan {
  pub package: String,
  pub version: String,
  pub steps: Vec<StepDescription>,
}

/// `build-record.json` written into the prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
  pub judgebox_version: String,
  pub manifest_digest: ContentHash,
  pub prefix: PathBuf,
  pub packages: Vec<BuildReport>,
  pub link_order: Vec<String>,
}
