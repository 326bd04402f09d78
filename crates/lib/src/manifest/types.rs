use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{DEFAULT_MARKER, DEFAULT_PREFIX, DEFAULT_WRAPPER, INFO_FILENAME};
use crate::invocation::InvocationSettings;
use crate::link::LibraryLinkNode;
use crate::platform::paths;
use crate::registry::{PackageSpec, SourceLocator};
use crate::toolchain::{PackageManagerSettings, ToolchainSettings};
use crate::util::hash::Hashable;

pub const PREFIX_ENV: &str = "JUDGEBOX_PREFIX";
pub const CACHE_DIR_ENV: &str = "JUDGEBOX_CACHE_DIR";
pub const JOBS_ENV: &str = "JUDGEBOX_JOBS";

#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid manifest {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("lua manifest {path} failed: {message}")]
  Lua { path: PathBuf, message: String },

  #[error("invalid value {value:?} for {var}")]
  InvalidEnv { var: &'static str, value: String },

  #[error("cannot make {path} absolute: {source}")]
  Path {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Everything one provisioning run needs to know.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
  #[serde(default)]
  pub settings: Settings,
  /// Packages in registration order.
  #[serde(default)]
  pub packages: Vec<PackageSpec>,
  /// Static libraries in first-introduction order.
  #[serde(default)]
  pub libraries: Vec<LibraryLinkNode>,
}

impl Hashable for Manifest {}

/// Run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
  #[serde(default = "default_prefix")]
  pub prefix: PathBuf,
  /// File recording the prefix root, read by the wrapper.
  #[serde(default = "default_marker")]
  pub marker: PathBuf,
  #[serde(default = "default_wrapper")]
  pub wrapper: PathBuf,
  /// Package listing; defaults to a file inside the prefix.
  #[serde(default)]
  pub info: Option<PathBuf>,
  /// Shared compiler cache; defaults to the user cache directory.
  #[serde(default)]
  pub cache_dir: Option<PathBuf>,
  /// Parent of the per-package workspaces; defaults to the system temp dir.
  #[serde(default)]
  pub work_dir: Option<PathBuf>,
  #[serde(default)]
  pub toolchain: ToolchainSettings,
  #[serde(default)]
  pub package_manager: PackageManagerSettings,
  #[serde(default)]
  pub invocation: InvocationSettings,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      prefix: default_prefix(),
      marker: default_marker(),
      wrapper: default_wrapper(),
      info: None,
      cache_dir: None,
      work_dir: None,
      toolchain: ToolchainSettings::default(),
      package_manager: PackageManagerSettings::default(),
      invocation: InvocationSettings::default(),
    }
  }
}

fn default_prefix() -> PathBuf {
  PathBuf::from(DEFAULT_PREFIX)
}

fn default_marker() -> PathBuf {
  PathBuf::from(DEFAULT_MARKER)
}

fn default_wrapper() -> PathBuf {
  PathBuf::from(DEFAULT_WRAPPER)
}

impl Settings {
  /// Apply `JUDGEBOX_PREFIX`, `JUDGEBOX_CACHE_DIR` and `JUDGEBOX_JOBS`.
  pub fn apply_env_overrides(&mut self) -> Result<(), ManifestError> {
    if let Some(prefix) = std::env::var_os(PREFIX_ENV).filter(|v| !v.is_empty()) {
      self.prefix = PathBuf::from(prefix);
    }
    if let Some(cache_dir) = std::env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
      self.cache_dir = Some(PathBuf::from(cache_dir));
    }
    if let Ok(jobs) = std::env::var(JOBS_ENV)
      && !jobs.is_empty()
    {
      let parsed = jobs
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|j| *j > 0)
        .ok_or_else(|| ManifestError::InvalidEnv {
          var: JOBS_ENV,
          value: jobs.clone(),
        })?;
      self.toolchain.jobs = Some(parsed);
    }
    Ok(())
  }

  /// Anchor every relative output location at the current directory.
  /// Build steps run with their workspace as the working directory.
  pub fn make_absolute(&mut self) -> Result<(), ManifestError> {
    anchor(&mut self.prefix)?;
    anchor(&mut self.marker)?;
    anchor(&mut self.wrapper)?;
    for path in [&mut self.info, &mut self.cache_dir, &mut self.work_dir].into_iter().flatten() {
      anchor(path)?;
    }
    Ok(())
  }

  pub fn info_path(&self) -> PathBuf {
    self.info.clone().unwrap_or_else(|| self.prefix.join(INFO_FILENAME))
  }

  pub fn cache_dir(&self) -> PathBuf {
    self.cache_dir.clone().unwrap_or_else(paths::cache_dir)
  }

  pub fn work_dir(&self) -> PathBuf {
    self.work_dir.clone().unwrap_or_else(paths::work_dir)
  }
}

fn anchor(path: &mut PathBuf) -> Result<(), ManifestError> {
  if path.is_relative() {
    *path = std::path::absolute(&*path).map_err(|source| ManifestError::Path {
      path: path.clone(),
      source,
    })?;
  }
  Ok(())
}

impl Manifest {
  /// Resolve relative local source paths against `base`.
  pub(crate) fn anchor_sources(&mut self, base: &Path) {
    for spec in &mut self.packages {
      if let SourceLocator::Path { path, .. } = &mut spec.source
        && path.is_relative()
      {
        *path = base.join(&*path);
      }
    }
  }
}
