use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declarative description of one package in the provisioning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
  pub name: String,
  pub version: String,
  #[serde(default)]
  pub source: SourceLocator,
  /// Names of packages that must be installed before this one.
  #[serde(default)]
  pub requires: Vec<String>,
  pub recipe: Recipe,
  #[serde(default)]
  pub params: BuildParams,
  /// Prefix-relative path prefixes this package may create or overwrite.
  #[serde(default)]
  pub targets: Vec<String>,
  /// Prefix-relative include directories added to the compile invocation.
  #[serde(default)]
  pub include_dirs: Vec<String>,
  /// Source-relative paths deleted from the staged tree before the recipe runs.
  #[serde(default)]
  pub prune: Vec<String>,
  /// Prefix-relative paths this package may delete although another package owns them.
  #[serde(default)]
  pub supersedes: Vec<String>,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
}

impl PackageSpec {
  /// Whether `relative` (a `/`-separated prefix-relative path) is one of this
  /// package's declared install targets.
  pub fn owns_target(&self, relative: &str) -> bool {
    self.targets.iter().any(|t| relative.starts_with(t.as_str()))
  }

  pub fn may_supersede(&self, relative: &str) -> bool {
    self.supersedes.iter().any(|t| relative.starts_with(t.as_str()))
  }
}

/// Where a package's sources come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLocator {
  /// An archive downloaded over HTTP(S).
  Url {
    url: String,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default = "default_strip_components")]
    strip_components: usize,
  },
  /// A local archive or directory.
  Path {
    path: PathBuf,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default = "default_strip_components")]
    strip_components: usize,
  },
  /// Nothing to fetch (system packages).
  #[default]
  None,
}

fn default_strip_components() -> usize {
  1
}

/// Per-package build parameters layered over the shared toolchain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildParams {
  /// Overrides the toolchain launcher; an empty string disables it.
  #[serde(default)]
  pub launcher: Option<String>,
  #[serde(default)]
  pub cflags: Vec<String>,
  #[serde(default)]
  pub cxxflags: Vec<String>,
  #[serde(default)]
  pub jobs: Option<usize>,
}

/// How a package is built and installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recipe {
  Autotools(AutotoolsRecipe),
  Cmake(CmakeRecipe),
  HeaderCopy(HeaderCopyRecipe),
  SystemPackage(SystemPackageRecipe),
}

impl Recipe {
  pub fn kind(&self) -> RecipeKind {
    match self {
      Recipe::Autotools(_) => RecipeKind::Autotools,
      Recipe::Cmake(_) => RecipeKind::Cmake,
      Recipe::HeaderCopy(_) => RecipeKind::HeaderCopy,
      Recipe::SystemPackage(_) => RecipeKind::SystemPackage,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecipeKind {
  Autotools,
  Cmake,
  HeaderCopy,
  SystemPackage,
}

impl fmt::Display for RecipeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      RecipeKind::Autotools => "autotools",
      RecipeKind::Cmake => "cmake",
      RecipeKind::HeaderCopy => "header-copy",
      RecipeKind::SystemPackage => "system-package",
    };
    f.write_str(name)
  }
}

/// bootstrap → configure → build → install.
///
/// Command overrides set to an empty string skip that step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutotoolsRecipe {
  #[serde(default)]
  pub bootstrap: Vec<String>,
  #[serde(default)]
  pub configure: Option<String>,
  #[serde(default)]
  pub configure_args: Vec<String>,
  /// Append `--prefix=$${prefix}` to the configure command.
  #[serde(default = "default_true")]
  pub prefix_arg: bool,
  #[serde(default = "default_true")]
  pub out_of_tree: bool,
  #[serde(default)]
  pub build: Option<String>,
  #[serde(default)]
  pub install: Option<String>,
}

impl Default for AutotoolsRecipe {
  fn default() -> Self {
    Self {
      bootstrap: Vec::new(),
      configure: None,
      configure_args: Vec::new(),
      prefix_arg: true,
      out_of_tree: true,
      build: None,
      install: None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmakeRecipe {
  #[serde(default)]
  pub generator: Option<String>,
  #[serde(default)]
  pub build_type: Option<String>,
  /// Source-relative directory holding the top-level `CMakeLists.txt`.
  #[serde(default)]
  pub source_dir: Option<String>,
  /// `KEY=VALUE` cache entries passed as `-DKEY=VALUE`.
  #[serde(default)]
  pub defines: Vec<String>,
  #[serde(default)]
  pub cxx_flags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderCopyRecipe {
  pub copy: Vec<CopyRule>,
  #[serde(default)]
  pub rewrite: Vec<RewriteRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPackageRecipe {
  pub package: String,
  #[serde(default)]
  pub version: Option<String>,
  /// Copies from absolute host paths into the prefix.
  pub relocate: Vec<CopyRule>,
  #[serde(default)]
  pub rewrite: Vec<RewriteRule>,
  /// Remove the OS copy once relocated.
  #[serde(default = "default_true")]
  pub remove: bool,
}

impl SystemPackageRecipe {
  /// The `name=version` argument handed to the package manager.
  pub fn package_arg(&self) -> String {
    match &self.version {
      Some(version) => format!("{}={}", self.package, version),
      None => self.package.clone(),
    }
  }
}

/// Copy `from` to the prefix-relative `to`. Directories are merged into the
/// destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CopyRule {
  pub from: String,
  pub to: String,
  /// Paths relative to `from` that are skipped.
  #[serde(default)]
  pub exclude: Vec<String>,
}

/// Replace the embedded absolute path `from` inside the prefix-relative `file`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRule {
  pub file: String,
  pub from: String,
  pub to: String,
}

fn default_true() -> bool {
  true
}

/// Malformed manifest content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
  #[error("package #{index} has an empty name")]
  EmptyName { index: usize },

  #[error("package '{0}' is declared more than once")]
  DuplicatePackage(String),

  #[error("package '{package}' requires unknown package '{prerequisite}'")]
  UnknownPrerequisite { package: String, prerequisite: String },

  #[error("package '{0}' requires itself")]
  SelfReference(String),

  #[error("invalid package '{package}': {reason}")]
  InvalidPackage { package: String, reason: String },

  #[error("toolchain is provided by unknown package '{0}'")]
  UnknownToolchainProvider(String),

  #[error("package '{package}' does not require toolchain provider '{provider}'")]
  UndeclaredToolchainDependency { package: String, provider: String },

  #[error("link token '{0}' is declared more than once")]
  DuplicateToken(String),

  #[error("link token '{token}' names unknown package '{package}'")]
  UnknownLibraryPackage { token: String, package: String },
}
