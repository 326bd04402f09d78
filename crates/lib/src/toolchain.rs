//! Shared toolchain descriptor.
//!
//! Every package is built with the same compilers, launcher, baseline flags
//! and compilation cache so that the whole prefix shares one ABI. Values may
//! reference `$${prefix}` so that packages built after the compiler pick up
//! the freshly installed one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::placeholder::{PlaceholderError, PrefixResolver, substitute};
use crate::registry::PackageSpec;

/// Toolchain section of the manifest settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSettings {
  #[serde(default = "default_cc")]
  pub cc: String,
  #[serde(default = "default_cxx")]
  pub cxx: String,
  /// Compilers used to build the toolchain provider itself.
  #[serde(default = "default_host_cc")]
  pub host_cc: String,
  #[serde(default = "default_host_cxx")]
  pub host_cxx: String,
  /// Package that installs `cc` and `cxx` into the prefix.
  #[serde(default)]
  pub provided_by: Option<String>,
  /// Compiler launcher, usually `ccache`.
  #[serde(default)]
  pub launcher: Option<String>,
  #[serde(default)]
  pub cflags: Vec<String>,
  #[serde(default)]
  pub cxxflags: Vec<String>,
  #[serde(default)]
  pub ldflags: Vec<String>,
  #[serde(default)]
  pub jobs: Option<usize>,
}

impl Default for ToolchainSettings {
  fn default() -> Self {
    Self {
      cc: default_cc(),
      cxx: default_cxx(),
      host_cc: default_host_cc(),
      host_cxx: default_host_cxx(),
      provided_by: None,
      launcher: None,
      cflags: Vec::new(),
      cxxflags: Vec::new(),
      ldflags: Vec::new(),
      jobs: None,
    }
  }
}

fn default_cc() -> String {
  "$${prefix}/bin/gcc".to_string()
}

fn default_cxx() -> String {
  "$${prefix}/bin/g++".to_string()
}

fn default_host_cc() -> String {
  "gcc".to_string()
}

fn default_host_cxx() -> String {
  "g++".to_string()
}

/// OS package manager command templates used by system-package recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageManagerSettings {
  /// Runs before each system package install, e.g. to refresh package lists.
  #[serde(default = "default_refresh")]
  pub refresh: Option<String>,
  #[serde(default = "default_install")]
  pub install: String,
  #[serde(default = "default_remove")]
  pub remove: String,
}

impl Default for PackageManagerSettings {
  fn default() -> Self {
    Self {
      refresh: default_refresh(),
      install: default_install(),
      remove: default_remove(),
    }
  }
}

fn default_refresh() -> Option<String> {
  Some("apt-get update".to_string())
}

fn default_install() -> String {
  "apt-get install -y --no-install-recommends".to_string()
}

fn default_remove() -> String {
  "apt-get remove -y".to_string()
}

/// Toolchain settings bound to one run's prefix, cache and parallelism.
#[derive(Debug, Clone)]
pub struct ToolchainDescriptor {
  settings: ToolchainSettings,
  prefix: PathBuf,
  cache_dir: PathBuf,
  jobs: usize,
}

impl ToolchainDescriptor {
  pub fn new(settings: ToolchainSettings, prefix: &Path, cache_dir: &Path, jobs: usize) -> Self {
    Self {
      settings,
      prefix: prefix.to_path_buf(),
      cache_dir: cache_dir.to_path_buf(),
      jobs,
    }
  }

  pub fn prefix(&self) -> &Path {
    &self.prefix
  }

  pub fn cache_dir(&self) -> &Path {
    &self.cache_dir
  }

  pub fn settings(&self) -> &ToolchainSettings {
    &self.settings
  }

  /// Resolve the toolchain one package is built with.
  pub fn for_package(&self, spec: &PackageSpec) -> Result<Toolchain, PlaceholderError> {
    let prefix = self.prefix.to_string_lossy();
    let resolver = PrefixResolver(&prefix);
    let render = |value: &str| substitute(value, &resolver);
    let render_all = |values: &[String]| values.iter().map(|v| render(v.as_str())).collect::<Result<Vec<_>, _>>();

    let is_provider = self.settings.provided_by.as_deref() == Some(spec.name.as_str());
    let (cc, cxx) = if is_provider {
      (render(self.settings.host_cc.as_str())?, render(self.settings.host_cxx.as_str())?)
    } else {
      (render(self.settings.cc.as_str())?, render(self.settings.cxx.as_str())?)
    };

    let launcher = match spec.params.launcher.as_deref().or(self.settings.launcher.as_deref()) {
      Some("") | None => None,
      Some(launcher) => Some(render(launcher)?),
    };

    let mut cflags = render_all(&self.settings.cflags)?;
    cflags.extend(render_all(&spec.params.cflags)?);
    let mut cxxflags = render_all(&self.settings.cxxflags)?;
    cxxflags.extend(render_all(&spec.params.cxxflags)?);

    Ok(Toolchain {
      cc,
      cxx,
      launcher,
      cflags,
      cxxflags,
      ldflags: render_all(&self.settings.ldflags)?,
      jobs: spec.params.jobs.or(self.settings.jobs).unwrap_or(self.jobs).max(1),
      cache_dir: self.cache_dir.clone(),
    })
  }
}

/// Fully resolved compilers and flags for one package build.
#[derive(Debug, Clone, PartialEq)]
pub struct Toolchain {
  pub cc: String,
  pub cxx: String,
  pub launcher: Option<String>,
  pub cflags: Vec<String>,
  pub cxxflags: Vec<String>,
  pub ldflags: Vec<String>,
  pub jobs: usize,
  pub cache_dir: PathBuf,
}

impl Toolchain {
  /// `cc` with the launcher in front, as build systems expect in `CC`.
  pub fn cc_command(&self) -> String {
    self.with_launcher(&self.cc)
  }

  pub fn cxx_command(&self) -> String {
    self.with_launcher(&self.cxx)
  }

  fn with_launcher(&self, compiler: &str) -> String {
    match &self.launcher {
      Some(launcher) => format!("{launcher} {compiler}"),
      None => compiler.to_string(),
    }
  }

  /// Environment variables exported to every recipe step.
  pub fn env(&self, prefix: &Path) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("CC".to_string(), self.cc_command());
    env.insert("CXX".to_string(), self.cxx_command());
    env.insert("CFLAGS".to_string(), self.cflags.join(" "));
    env.insert("CXXFLAGS".to_string(), self.cxxflags.join(" "));
    env.insert("LDFLAGS".to_string(), self.ldflags.join(" "));
    env.insert("CCACHE_DIR".to_string(), self.cache_dir.to_string_lossy().into_owned());
    env.insert(
      "LD_LIBRARY_PATH".to_string(),
      prefix.join("lib64").to_string_lossy().into_owned(),
    );
    env
  }

  /// Cache entries describing the toolchain to CMake.
  pub fn cmake_args(&self) -> Vec<String> {
    let mut args = vec![
      format!("-DCMAKE_C_COMPILER={}", self.cc),
      format!("-DCMAKE_CXX_COMPILER={}", self.cxx),
    ];
    if let Some(launcher) = &self.launcher {
      args.push(format!("-DCMAKE_C_COMPILER_LAUNCHER={launcher}"));
      args.push(format!("-DCMAKE_CXX_COMPILER_LAUNCHER={launcher}"));
    }
    args
  }
}
