use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::placeholder::PlaceholderError;
use crate::prefix::{PrefixChanges, PrefixError};
use crate::registry::RecipeKind;

/// A named phase of a package build, used to locate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStep {
  Fetch,
  Stage,
  Prune,
  Bootstrap,
  Configure,
  Build,
  Install,
  Copy,
  Relocate,
  Rewrite,
  RemoveSystemPackage,
  VerifyPrefix,
}

impl fmt::Display for BuildStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      BuildStep::Fetch => "fetch",
      BuildStep::Stage => "stage",
      BuildStep::Prune => "prune",
      BuildStep::Bootstrap => "bootstrap",
      BuildStep::Configure => "configure",
      BuildStep::Build => "build",
      BuildStep::Install => "install",
      BuildStep::Copy => "copy",
      BuildStep::Relocate => "relocate",
      BuildStep::Rewrite => "rewrite",
      BuildStep::RemoveSystemPackage => "remove-system-package",
      BuildStep::VerifyPrefix => "verify-prefix",
    };
    f.write_str(name)
  }
}

/// A fatal failure of one package build.
#[derive(Debug, Error)]
#[error("build of '{package}' failed at step '{step}'")]
pub struct BuildError {
  pub package: String,
  pub step: BuildStep,
  #[source]
  pub source: StepError,
}

#[derive(Debug, Error)]
pub enum StepError {
  #[error("command `{cmd}` exited with {}{}", format_code(.code), format_tail(.tail))]
  Command {
    cmd: String,
    code: Option<i32>,
    /// Last lines of combined output.
    tail: Vec<String>,
  },

  #[error("command `{cmd}` timed out after {}s", .timeout.as_secs())]
  TimedOut { cmd: String, timeout: Duration },

  #[error("i/o error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to fetch {url}: {message}")]
  Fetch { url: String, message: String },

  #[error("hash mismatch for {source_name}: expected {expected}, got {actual}")]
  HashMismatch {
    source_name: String,
    expected: String,
    actual: String,
  },

  #[error("unsupported archive {0}")]
  Archive(String),

  #[error("cannot quote {0:?} for the shell")]
  Quote(String),

  #[error(transparent)]
  Placeholder(#[from] PlaceholderError),

  #[error(transparent)]
  Prefix(#[from] PrefixError),
}

fn format_code(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("code {code}"),
    None => "a signal".to_string(),
  }
}

fn format_tail(tail: &[String]) -> String {
  if tail.is_empty() {
    String::new()
  } else {
    format!("\n  {}", tail.join("\n  "))
  }
}

impl StepError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StepError {
    let path = path.into();
    move |source| StepError::Io { path, source }
  }

  pub(crate) fn at(self, package: &str, step: BuildStep) -> BuildError {
    BuildError {
      package: package.to_string(),
      step,
      source: self,
    }
  }
}

/// Summary of one finished package build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
  pub package: String,
  pub version: String,
  pub kind: RecipeKind,
  #[serde(with = "duration_secs")]
  pub duration: Duration,
  pub changes: PrefixChanges,
}

mod duration_secs {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Ok(Duration::from_secs_f64(secs.max(0.0)))
  }
}
